mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::SetupArgs;
use crate::output::{OutputFormat, print_error};

/// kiln - build description interpreter
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Evaluate a source tree into a build directory
  Setup(SetupArgs),

  /// List the targets of the last evaluation
  Targets {
    /// Build directory of an earlier `kiln setup`
    #[arg(default_value = "build")]
    builddir: PathBuf,

    /// Output format
    #[arg(short = 'o', long = "format", value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Setup(args) => cmd::cmd_setup(args, cli.verbose),
    Commands::Targets { builddir, output } => cmd::cmd_targets(&builddir, output),
  };
  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
