pub mod account_source;
pub mod cache;
pub mod config;
pub mod error;
pub mod registrar_store;
pub mod rpc;
pub mod service;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, Error};
pub use service::{GovernancePower, GovernanceService};
