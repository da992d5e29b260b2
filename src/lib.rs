//! Personal finance tracking service.
//!
//! Users upload transactions as delimited text; each line is validated on its
//! own and the valid ones are committed as one atomic batch. Reports sum the
//! stored amounts with exact decimal arithmetic.

pub mod auth;
pub mod config;
pub mod front;
pub mod ingest;
pub mod migration;
pub mod models;
pub mod report;
pub mod store;
pub mod validator;
