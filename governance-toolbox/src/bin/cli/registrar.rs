use super::Error;
use governance_toolbox::config::{Config, RegistrarSource};
use governance_toolbox::GovernanceService;
use std::io::Write;
use structopt::StructOpt;
use vsr_snapshot_lib::RegistrarParams as Params;

/// Prints the multiplier parameters in the `registrar_params` format of the
/// configuration file, so they can be pinned for offline use.
#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct RegistrarParams {}

impl RegistrarParams {
    pub fn exec(self, config: &Config) -> Result<(), Error> {
        let service = GovernanceService::from_config(config)?;
        let params = Params::from(*service.registrar_config()?);
        if let RegistrarSource::Account {
            address,
            voting_mint_index,
        } = config.registrar_source()?
        {
            log::info!("read from registrar {} voting mint {}", address, voting_mint_index);
        }
        let mut stdout = std::io::stdout();
        stdout.write_all(serde_yaml::to_string(&params)?.as_bytes())?;
        Ok(())
    }
}
