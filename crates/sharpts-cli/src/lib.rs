//! The `sharpts` command-line interface.
//!
//! Two subcommands cover the consumer contract: `run` interprets a
//! source file and prints the program's output; `compile` writes the IL
//! artifact plus its companion runtime configuration. Exit code 0 on
//! success, non-zero on any failure.

mod args;
pub use args::{CliArgs, Command};

mod driver;
pub use driver::run;
