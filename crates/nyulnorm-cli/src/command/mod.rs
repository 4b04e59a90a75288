use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{apply::ApplyArg, run::RunArg, train::TrainArg};

mod apply;
mod run;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log debug messages (overridden by `RUST_LOG`)
    #[arg(long, short, global = true)]
    verbose: bool,
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Learn a landmark table from a folder of images
    Train(#[clap(flatten)] TrainArg),
    /// Standardize a folder of images with a saved model
    Apply(#[clap(flatten)] ApplyArg),
    /// Train on a folder (or reuse its saved model) and standardize it
    Run(#[clap(flatten)] RunArg),
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_logging(args.verbose)?;
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Apply(arg) => apply::run(&arg)?,
        Mode::Run(arg) => run::run(&arg)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn test_command_definition() {
        CommandArgs::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let args = CommandArgs::try_parse_from([
            "nyulnorm",
            "apply",
            "--model",
            "model.json",
            "--input-dir",
            "scans",
            "--tail",
            "linear",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        let Mode::Apply(arg) = args.mode else {
            panic!("expected apply mode");
        };
        assert_eq!(arg.tail, nyulnorm_core::tail::TailMode::Linear);
        assert!(arg.output_dir.is_none());
    }

    #[test]
    fn test_parse_train_percentiles() {
        let args = CommandArgs::try_parse_from([
            "nyulnorm",
            "train",
            "--input-dir",
            "scans",
            "--percentiles",
            "2,25,50,75,98",
        ])
        .unwrap();
        let Mode::Train(arg) = args.mode else {
            panic!("expected train mode");
        };
        assert_eq!(
            arg.percentiles.as_deref(),
            Some([2.0, 25.0, 50.0, 75.0, 98.0].as_slice())
        );
        assert!(!arg.per_slice);
    }
}
