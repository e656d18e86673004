use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// aotscope - NativeAOT executable inspection
#[derive(Debug, Parser)]
#[command(name = "aotscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// The executable and the location of its runtime header.
#[derive(Debug, Args)]
pub struct ImageArgs {
    /// Path to the NativeAOT executable.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Address of the runtime header, relative to the image base (hex like 0x21f40 or decimal).
    #[arg(long, value_name = "ADDRESS", value_parser = parse_address)]
    pub header: u64,

    /// Skip string discovery.
    #[arg(long)]
    pub no_strings: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Display the runtime header, its sections and the compiler identifier.
    Info {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// List string objects found in the reconstructed heap.
    Strings {
        #[command(flatten)]
        image: ImageArgs,

        /// Show only strings containing this text.
        #[arg(long, value_name = "TEXT")]
        contains: Option<String>,
    },

    /// Write the reconstructed heap to a file.
    Heap {
        #[command(flatten)]
        image: ImageArgs,

        /// Output file for the raw heap bytes.
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn parse_address(value: &str) -> Result<u64, String> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address '{value}': {e}"))
}
