use crate::demo::{run_candidates, run_demo, CandidatesArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use donor_match::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Donor Match",
    about = "Run the donation matching service or explore the matcher from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Rank the donors of a roster for an ad hoc blood or organ need
    Candidates(CandidatesArgs),
    /// Walk a request from intake to transplant against in-memory adapters
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Donor roster CSV used to seed the in-memory store
    #[arg(long)]
    pub(crate) donors: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Candidates(args) => run_candidates(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
