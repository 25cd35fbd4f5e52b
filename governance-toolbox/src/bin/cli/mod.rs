mod power;
mod registrar;
mod snapshot;

use governance_toolbox::config::Config;
use governance_toolbox::rpc::Pagination;
use governance_toolbox::ConfigError;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use structopt::StructOpt;
use vsr_snapshot_lib::Address;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Toolbox(#[from] governance_toolbox::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown output format `{}`, expected json or csv", other)),
        }
    }
}

/// Writes to `path`, or to the standard output when absent.
pub fn open_output(path: &Option<PathBuf>) -> Result<Box<dyn Write>, io::Error> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    })
}

/// Values given on the command line take precedence over the config file.
#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct ConfigOverrides {
    /// URL of the Solana JSON-RPC endpoint
    #[structopt(long, short = "u")]
    json_rpc_url: Option<String>,

    /// Voter Stake Registry program id
    #[structopt(long)]
    program_id: Option<Address>,

    /// Registrar account holding the voting mint configuration
    #[structopt(long)]
    registrar: Option<Address>,

    #[structopt(long)]
    voting_mint_index: Option<usize>,

    /// Page size for providers supporting `getProgramAccountsV2`
    #[structopt(long)]
    page_limit: Option<usize>,

    /// Threads used to evaluate deposits
    #[structopt(long)]
    workers: Option<usize>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut Config) {
        let Self {
            json_rpc_url,
            program_id,
            registrar,
            voting_mint_index,
            page_limit,
            workers,
        } = self;
        if let Some(json_rpc_url) = json_rpc_url {
            config.json_rpc_url = json_rpc_url;
        }
        if let Some(program_id) = program_id {
            config.program_id = program_id;
        }
        if let Some(registrar) = registrar {
            config.registrar = Some(registrar);
            config.registrar_params = None;
        }
        if let Some(voting_mint_index) = voting_mint_index {
            config.voting_mint_index = voting_mint_index;
        }
        if let Some(limit) = page_limit {
            config.pagination = Pagination::Cursor { limit };
        }
        if let Some(workers) = workers {
            config.workers = workers;
        }
    }
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub struct Cli {
    /// Configuration file to use
    #[structopt(long, short = "C")]
    config_file: Option<PathBuf>,

    /// Write the effective configuration to a file
    #[structopt(long, short = "S")]
    save_config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug, trace)
    #[structopt(long, short = "L", default_value = "info")]
    log_level: String,

    #[structopt(flatten)]
    overrides: ConfigOverrides,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
#[structopt(rename_all = "kebab-case")]
pub enum Command {
    /// Governance power of one or more wallets
    Power(power::Power),
    /// Voting power of every wallet in the registry
    Snapshot(snapshot::VotingPowerSnapshot),
    /// Print the registrar configuration used for multipliers
    Registrar(registrar::RegistrarParams),
}

impl Cli {
    pub fn exec(self) -> Result<(), Error> {
        let Self {
            config_file,
            save_config,
            log_level,
            overrides,
            command,
        } = self;
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .init();

        let config = load_config(config_file.as_deref(), overrides)?;
        if let Some(path) = save_config {
            config.save(path)?;
        }

        match command {
            Command::Power(power) => power.exec(&config),
            Command::Snapshot(snapshot) => snapshot.exec(&config),
            Command::Registrar(registrar) => registrar.exec(&config),
        }
    }
}

fn load_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Config, Error> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}
