use std::process::ExitCode;

use clap::Parser;

use smugcli::commands::{self, Cli};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match commands::run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("smugcli: {err:#}");
            ExitCode::from(1)
        }
    }
}
