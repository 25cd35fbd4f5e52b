use crate::account_source::AccountSource;
use crate::config::RegistrarSource;
use crate::error::{ConfigError, Error};
use crate::rpc::ProgramAccountsRpc;
use log::info;
use std::sync::{Arc, PoisonError, RwLock};
use vsr_snapshot_lib::{Registrar, RegistrarConfig};

/// Holds the registrar configuration once loaded.
///
/// Every scan takes an `Arc` snapshot and uses it for all its multipliers, so
/// a concurrent [`RegistrarStore::reload`] never mixes two configurations
/// inside one result.
#[derive(Debug)]
pub struct RegistrarStore {
    source: RegistrarSource,
    current: RwLock<Option<Arc<RegistrarConfig>>>,
}

impl RegistrarStore {
    pub fn new(source: RegistrarSource) -> Self {
        Self {
            source,
            current: RwLock::new(None),
        }
    }

    /// The loaded configuration, loading it on first use.
    pub fn snapshot<R: ProgramAccountsRpc>(
        &self,
        accounts: &AccountSource<R>,
    ) -> Result<Arc<RegistrarConfig>, Error> {
        if let Some(current) = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(current));
        }
        let loaded = Arc::new(self.load(accounts)?);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(current.get_or_insert(loaded)))
    }

    /// Reads the configuration again and replaces the current one.
    pub fn reload<R: ProgramAccountsRpc>(
        &self,
        accounts: &AccountSource<R>,
    ) -> Result<Arc<RegistrarConfig>, Error> {
        let loaded = Arc::new(self.load(accounts)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn load<R: ProgramAccountsRpc>(
        &self,
        accounts: &AccountSource<R>,
    ) -> Result<RegistrarConfig, Error> {
        let config = match &self.source {
            RegistrarSource::Explicit(config) => *config,
            RegistrarSource::Account {
                address,
                voting_mint_index,
            } => {
                let data = accounts
                    .fetch_account(address)?
                    .ok_or(ConfigError::RegistrarNotFound(*address))?;
                let registrar = Registrar::decode(&data).map_err(ConfigError::Registrar)?;
                registrar
                    .registrar_config(*voting_mint_index)
                    .map_err(ConfigError::InvalidRegistrar)?
            }
        };
        info!(
            "registrar configuration: baseline {}, max extra {}, saturation {}s",
            config.baseline_weight(),
            config.max_extra_weight(),
            config.lockup_saturation_secs()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRpc;
    use vsr_snapshot_lib::testing::RegistrarAccountBuilder;
    use vsr_snapshot_lib::{Address, RegistrarConfigError};

    const REGISTRAR: Address = Address::new([42; 32]);

    fn account_source() -> RegistrarSource {
        RegistrarSource::Account {
            address: REGISTRAR,
            voting_mint_index: 0,
        }
    }

    #[test]
    fn loads_once_and_reloads_on_demand() {
        let rpc = FakeRpc::default();
        rpc.insert_account(
            REGISTRAR,
            RegistrarAccountBuilder::new()
                .voting_mint(0, Address::new([1; 32]), 1_000_000_000, 0, 100)
                .build(),
        );
        let accounts = AccountSource::new(rpc);
        let store = RegistrarStore::new(account_source());

        let first = store.snapshot(&accounts).unwrap();
        assert_eq!(first.lockup_saturation_secs(), 100);

        accounts.rpc().insert_account(
            REGISTRAR,
            RegistrarAccountBuilder::new()
                .voting_mint(0, Address::new([1; 32]), 1_000_000_000, 0, 200)
                .build(),
        );
        assert!(Arc::ptr_eq(&first, &store.snapshot(&accounts).unwrap()));

        let reloaded = store.reload(&accounts).unwrap();
        assert_eq!(reloaded.lockup_saturation_secs(), 200);
        assert_eq!(first.lockup_saturation_secs(), 100);
        assert!(Arc::ptr_eq(&reloaded, &store.snapshot(&accounts).unwrap()));
    }

    #[test]
    fn explicit_configuration_needs_no_rpc() {
        let config = RegistrarConfig::new(1, 2, 3).unwrap();
        let store = RegistrarStore::new(RegistrarSource::Explicit(config));
        let accounts = AccountSource::new(FakeRpc::default());
        assert_eq!(*store.snapshot(&accounts).unwrap(), config);
    }

    #[test]
    fn missing_registrar_account() {
        let store = RegistrarStore::new(account_source());
        let accounts = AccountSource::new(FakeRpc::default());
        assert!(matches!(
            store.snapshot(&accounts),
            Err(Error::Config(ConfigError::RegistrarNotFound(_)))
        ));
    }

    #[test]
    fn unconfigured_voting_mint() {
        let rpc = FakeRpc::default();
        rpc.insert_account(REGISTRAR, RegistrarAccountBuilder::new().build());
        let store = RegistrarStore::new(account_source());
        assert!(matches!(
            store.snapshot(&AccountSource::new(rpc)),
            Err(Error::Config(ConfigError::InvalidRegistrar(
                RegistrarConfigError::UnknownVotingMint(0)
            )))
        ));
    }

    #[test]
    fn garbage_registrar_account() {
        let rpc = FakeRpc::default();
        rpc.insert_account(REGISTRAR, vec![0; 10]);
        let store = RegistrarStore::new(account_source());
        assert!(matches!(
            store.snapshot(&AccountSource::new(rpc)),
            Err(Error::Config(ConfigError::Registrar(_)))
        ));
    }
}
