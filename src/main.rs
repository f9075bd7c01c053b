use clap::Parser;

use thresher::cli::{Cli, Command};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run { config } => thresher::cli::run::execute(&config).await,
        Command::Check { config } => thresher::cli::check::execute(&config).await,
    };

    std::process::exit(code);
}
