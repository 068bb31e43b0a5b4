use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use nnlat_cli::commands::{config_ops, decode_ops, lattice_ops};
use nnlat_cli::logging::init_logging;

#[derive(Parser)]
#[command(name = "nnlattool", about = "Word lattice decoding with a neural network LM")]
struct Cli {
    /// Write log events to this file as JSON lines (default: stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode word lattices and write the best hypotheses
    Decode(decode_ops::DecodeArgs),
    /// Show the size and node order of an SLF lattice
    LatticeInfo {
        /// SLF lattice file
        file: String,
    },
    /// Print the default decoding settings
    SettingsExport,
    /// Validate a decoding settings file
    SettingsValidate {
        /// Settings TOML file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref(), &cli.log_level).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });

    match cli.command {
        Command::Decode(args) => decode(&args),
        Command::LatticeInfo { file } => lattice_ops::lattice_info(&file),
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
    }
}

#[cfg(feature = "neural")]
fn decode(args: &decode_ops::DecodeArgs) {
    decode_ops::decode_cmd(args);
}

#[cfg(not(feature = "neural"))]
fn decode(_args: &decode_ops::DecodeArgs) {
    eprintln!("Error: nnlattool was built without the `neural` feature");
    process::exit(1);
}
