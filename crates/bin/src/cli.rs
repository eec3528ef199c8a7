//! CLI argument definitions for the Rosetta binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rosetta::constants::DEFAULT_PORT;

/// Rosetta collaborative mapping server and client
#[derive(Parser, Debug)]
#[command(name = "rosetta")]
#[command(about = "Rosetta: edit deobfuscation mappings together, live")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a dedicated mapping server
    Serve(ServeArgs),
    /// Join a mapping server from the terminal and chat
    Connect(ConnectArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "ROSETTA_PORT")]
    pub port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "ROSETTA_HOST")]
    pub host: String,

    /// Password clients must present. Empty lets anyone in.
    #[arg(long, default_value = "", env = "ROSETTA_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// The binary being mapped; clients must have the same file.
    /// Without it the checksum is all zeros.
    #[arg(long)]
    pub jar: Option<PathBuf>,

    /// Append every mapping change to this file as JSON lines
    #[arg(long)]
    pub delta_log: Option<PathBuf>,

    /// Seconds between two checks for new mapping changes
    #[arg(long, default_value_t = 60)]
    pub delta_interval: u64,
}

/// Arguments for the connect command
#[derive(clap::Args, Debug)]
pub struct ConnectArgs {
    /// Host of the server
    #[arg(long, default_value = "127.0.0.1", env = "ROSETTA_HOST")]
    pub host: String,

    /// Port of the server
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "ROSETTA_PORT")]
    pub port: u16,

    /// Name shown to the other users
    #[arg(short, long, env = "ROSETTA_USERNAME")]
    pub username: String,

    /// Server password
    #[arg(long, default_value = "", env = "ROSETTA_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Local copy of the binary being mapped
    #[arg(long)]
    pub jar: Option<PathBuf>,
}
