use crate::account_source::FetchError;
use vsr_snapshot_lib::{AddressError, DecodeError, RegistrarConfigError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no registrar configured: set either `registrar` or `registrar_params`")]
    MissingRegistrar,

    #[error("invalid registrar configuration: {0}")]
    InvalidRegistrar(#[from] RegistrarConfigError),

    #[error("registrar account {0} does not exist")]
    RegistrarNotFound(vsr_snapshot_lib::Address),

    #[error("cannot decode registrar account: {0}")]
    Registrar(#[from] DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressError),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
