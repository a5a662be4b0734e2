use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "bucketwatch")]
#[command(about = "Multi-account storage bucket monitor", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API and the scheduled refresh
    Server(ServerArgs),
    /// Run one global refresh and print its summary as JSON
    Refresh(StoreArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(clap::Args, Debug)]
pub struct StoreArgs {
    /// Keep all state in memory instead of the on-disk keyspace
    #[arg(long)]
    pub in_memory: bool,

    /// Use a scripted provider and seed a `demo` user
    #[arg(long)]
    pub demo: bool,
}
