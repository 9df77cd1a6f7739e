use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jobledger")]
#[command(about = "Job lifecycle ledger for queue monitoring", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $JOBLEDGER_CONFIG or config/jobledger.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the dashboard API and the periodic trimmer
    Serve(ServeArgs),
    /// Trim every index once and exit
    Trim,
    /// Print counts and lifetime totals as JSON
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
