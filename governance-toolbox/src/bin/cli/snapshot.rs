use super::{open_output, Error, OutputFormat};
use governance_toolbox::config::Config;
use governance_toolbox::GovernanceService;
use serde::Serialize;
use std::path::PathBuf;
use structopt::StructOpt;
use vsr_snapshot_lib::{to_f64, Timestamp, WalletId, WalletPower};

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct VotingPowerSnapshot {
    /// Unix time to evaluate lockups at, defaults to the time of the scan
    #[structopt(long)]
    at: Option<Timestamp>,

    /// Output format: json or csv
    #[structopt(long, default_value = "csv")]
    format: OutputFormat,

    /// Results file output path, defaults to stdout
    #[structopt(long, short)]
    output: Option<PathBuf>,

    /// Where to write the accounts that could not be decoded, as csv
    #[structopt(long)]
    skipped: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WalletRow {
    wallet: WalletId,
    native_power: f64,
    delegated_power: f64,
    total_power: f64,
}

impl WalletRow {
    fn new(wallet: WalletId, power: &WalletPower) -> Self {
        let native_power = to_f64(power.native);
        let delegated_power = to_f64(power.delegated);
        Self {
            wallet,
            native_power,
            delegated_power,
            total_power: native_power + delegated_power,
        }
    }
}

impl VotingPowerSnapshot {
    pub fn exec(self, config: &Config) -> Result<(), Error> {
        let Self {
            at,
            format,
            output,
            skipped,
        } = self;
        let service = GovernanceService::from_config(config)?;
        let (snapshot, table) = service.voting_power_table(at)?;
        let rows: Vec<_> = table
            .iter()
            .map(|(wallet, power)| WalletRow::new(*wallet, power))
            .collect();

        let writer = open_output(&output)?;
        match format {
            OutputFormat::Json => serde_json::to_writer_pretty(writer, &rows)?,
            OutputFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(writer);
                for row in &rows {
                    csv_writer.serialize(row)?;
                }
                csv_writer.flush()?;
            }
        }

        if let Some(path) = skipped {
            let mut csv_writer = csv::Writer::from_path(path)?;
            for account in snapshot.skipped() {
                csv_writer.serialize(account)?;
            }
            csv_writer.flush()?;
        }
        Ok(())
    }
}
