use super::{open_output, Error, OutputFormat};
use governance_toolbox::config::Config;
use governance_toolbox::{GovernancePower, GovernanceService};
use serde::Serialize;
use std::path::PathBuf;
use structopt::StructOpt;
use vsr_snapshot_lib::{Timestamp, WalletId};

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct Power {
    /// Wallets to compute the governance power of
    #[structopt(required = true)]
    wallets: Vec<WalletId>,

    /// Unix time to evaluate lockups at, defaults to the time of the scan
    #[structopt(long)]
    at: Option<Timestamp>,

    /// Output format: json or csv
    #[structopt(long, default_value = "json")]
    format: OutputFormat,

    /// Results file output path, defaults to stdout
    #[structopt(long, short)]
    output: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PowerRow {
    wallet: WalletId,
    native_power: f64,
    delegated_power: f64,
    total_power: f64,
    deposits: usize,
    skipped_accounts: usize,
}

impl From<&GovernancePower> for PowerRow {
    fn from(power: &GovernancePower) -> Self {
        Self {
            wallet: power.wallet,
            native_power: power.native_power,
            delegated_power: power.delegated_power,
            total_power: power.total_power,
            deposits: power.deposits.len(),
            skipped_accounts: power.skipped_accounts.len(),
        }
    }
}

impl Power {
    pub fn exec(self, config: &Config) -> Result<(), Error> {
        let Self {
            wallets,
            at,
            format,
            output,
        } = self;
        let results =
            GovernanceService::from_config(config)?.compute_governance_power_batch(&wallets, at)?;

        let writer = open_output(&output)?;
        match format {
            OutputFormat::Json => serde_json::to_writer_pretty(writer, &results)?,
            OutputFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(writer);
                for result in &results {
                    csv_writer.serialize(PowerRow::from(result))?;
                }
                csv_writer.flush()?;
            }
        }
        Ok(())
    }
}
