use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the sharpts binary.
#[derive(Parser, Debug)]
#[command(
    name = "sharpts",
    version,
    about = "SharpTS - TypeScript interpreter and IL compiler"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Type-check and interpret a source file.
    Run {
        /// The TypeScript source file.
        file: PathBuf,

        /// Arguments passed through to the program as `process.argv`.
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Type-check a source file and write the IL artifact.
    Compile {
        /// The TypeScript source file.
        file: PathBuf,

        /// Output path for the artifact (defaults to the input with an
        /// `.il` extension).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Type-check a source file without running or emitting.
    Check {
        /// The TypeScript source file.
        file: PathBuf,
    },
}
