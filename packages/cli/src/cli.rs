// ABOUTME: Command-line argument definitions for the fnbox binary
// ABOUTME: Subcommands for serving the gateway and one-shot invoke, upload, list and sweep

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fnbox")]
#[command(about = "fnbox - run stored code artifacts in ephemeral containers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Bind host (overrides FNBOX_HOST)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a stored artifact once and print its output
    Invoke {
        /// Artifact key in the configured namespace
        key: String,
    },
    /// Upload a source file as an artifact
    Upload {
        /// Path of the file to upload
        path: PathBuf,
        /// Store under this key instead of a generated one
        #[arg(long)]
        key: Option<String>,
    },
    /// List artifact keys in the configured namespace
    List,
    /// Remove orphaned workspaces and leftover containers
    Sweep,
}
