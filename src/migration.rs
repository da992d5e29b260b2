use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use sqlx::{Pool, Postgres, Row};

/// Collects `NNN_name.sql` files from `dir`, sorted by their numeric prefix.
pub fn migration_files(dir: &Path) -> anyhow::Result<Vec<(usize, PathBuf)>> {
    let mut migration_files: Vec<(usize, PathBuf)> = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("cannot read migrations dir {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        if !entry.metadata()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "sql") {
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("non utf-8 migration name: {}", path.display()))?;
        let migration_number: usize = file_name
            .get(..3)
            .and_then(|prefix| prefix.parse().ok())
            .ok_or_else(|| anyhow!("migration {} must start with a 3 digit number", file_name))?;

        migration_files.push((migration_number, path))
    }

    migration_files.sort_by_key(|v| v.0);

    if let Some(w) = migration_files.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(anyhow!(
            "duplicate migration number {} ({} and {})",
            w[0].0,
            w[0].1.display(),
            w[1].1.display()
        ));
    }

    Ok(migration_files)
}

/// Applies every migration not yet recorded in `schema_migrations`.
pub async fn migrate(p: &Pool<Postgres>, dir: &Path) -> anyhow::Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(p)
    .await?;

    let applied: Vec<i64> = sqlx::query("SELECT version FROM schema_migrations")
        .fetch_all(p)
        .await?
        .iter()
        .map(|row| row.try_get(0))
        .collect::<Result<_, _>>()?;

    log::info!("starting migration");
    for (number, path) in migration_files(dir)? {
        let version = number as i64;
        if applied.contains(&version) {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        log::info!("migrating {}", path.display());

        let mut tx = p.begin().await?;
        sqlx::raw_sql(&content)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("migration {} failed", path.display()))?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    log::info!("migration end");
    Ok(())
}
