use clap::Parser;

fn main() {
    let args = sharpts_cli::CliArgs::parse();
    std::process::exit(sharpts_cli::run(args));
}
