// This file is part of Warden.
//
// Warden is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Warden is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Warden.
// If not, see https://www.gnu.org/licenses/.

//! Warden CLI: drives the authorization engine against the in-memory
//! sim ledger.

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod script;

#[derive(Parser)]
#[command(name = "warden", version, about = "Account-abstraction authorization engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a command script against a fresh in-memory engine.
    ///
    /// Commands are newline-delimited JSON objects read from the script
    /// file, or from stdin if none is given. Each command prints one
    /// JSON result line; the first engine-reported error stops the run.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Script file; stdin if omitted
    #[arg(long)]
    script: Option<std::path::PathBuf>,

    /// Chain id operation hashes bind to
    #[arg(long, default_value_t = 31_337)]
    chain_id: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => script::run(args).await,
    }
}
