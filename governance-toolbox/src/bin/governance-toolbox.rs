use color_eyre::Report;
use structopt::StructOpt;

pub mod cli;

fn main() -> Result<(), Report> {
    color_eyre::install()?;
    cli::Cli::from_args().exec()?;
    Ok(())
}
