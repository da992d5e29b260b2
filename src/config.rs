use std::{net::SocketAddr, path::PathBuf};

use anyhow::anyhow;
use argon2::Params;
use clap::Parser;

use crate::auth::AuthSettings;

const DEV_TOKEN_SECRET: &str = "dev-secret-key";
/// One year. `chrono::Duration` panics well above this.
const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Parser)]
#[command(name = "finance-tracker", version, about = "Personal finance tracking API")]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    /// PostgreSQL connection string. Without it data lives in memory only.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    #[arg(long, env = "MIGRATIONS_DIR", default_value = "./migrations")]
    pub migrations_dir: PathBuf,

    /// Key used to sign bearer tokens.
    #[arg(long, env = "TOKEN_SECRET", default_value = DEV_TOKEN_SECRET, hide_env_values = true)]
    pub token_secret: String,

    #[arg(long, env = "TOKEN_TTL_MINUTES", default_value_t = 60)]
    pub token_ttl_minutes: i64,

    /// Argon2 memory cost in KiB for new password hashes.
    #[arg(long, env = "HASH_MEMORY_KIB", default_value_t = Params::DEFAULT_M_COST)]
    pub hash_memory_kib: u32,

    /// Argon2 passes for new password hashes.
    #[arg(long, env = "HASH_ITERATIONS", default_value_t = Params::DEFAULT_T_COST)]
    pub hash_iterations: u32,

    /// Largest accepted upload body.
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Field separator of uploaded transaction files.
    #[arg(long, env = "CSV_DELIMITER", default_value_t = ',')]
    pub delimiter: char,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.delimiter.is_ascii() || matches!(self.delimiter, '\n' | '\r' | '"') {
            return Err(anyhow!(
                "delimiter must be a single ascii character other than a line break or quote"
            ));
        }
        if !(1..=MAX_TOKEN_TTL_MINUTES).contains(&self.token_ttl_minutes) {
            return Err(anyhow!(
                "token ttl must be between 1 and {} minutes",
                MAX_TOKEN_TTL_MINUTES
            ));
        }
        self.hash_params()?;
        if self.token_secret == DEV_TOKEN_SECRET {
            log::warn!("using the development token secret, set TOKEN_SECRET in production");
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    fn hash_params(&self) -> anyhow::Result<Params> {
        Params::new(self.hash_memory_kib, self.hash_iterations, Params::DEFAULT_P_COST, None)
            .map_err(|err| anyhow!("invalid password hashing cost: {}", err))
    }

    /// Settings for the auth gateway. Call after `validate`.
    pub fn auth_settings(&self) -> anyhow::Result<AuthSettings> {
        let token_ttl = chrono::Duration::try_minutes(self.token_ttl_minutes)
            .ok_or_else(|| anyhow!("token ttl out of range"))?;
        Ok(AuthSettings {
            secret: self.token_secret.as_bytes().to_vec(),
            token_ttl,
            hash_params: self.hash_params()?,
        })
    }
}
