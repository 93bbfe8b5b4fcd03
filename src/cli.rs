use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// rotator: four-phase PostgreSQL credential rotation
#[derive(Parser)]
#[command(name = "rotator", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one rotation step
    Rotate {
        #[arg(long)]
        secret_id: String,
        /// Version id (ClientRequestToken) being rotated
        #[arg(long)]
        token: String,
        /// createSecret, setSecret, testSecret or finishSecret
        #[arg(long)]
        step: String,
    },

    /// Run one rotation step from a JSON invocation event
    Invoke {
        /// Event file; reads stdin when omitted
        #[arg(long)]
        event: Option<PathBuf>,
    },

    /// Serve the rotation endpoint over HTTP
    Serve {
        /// Port to bind (defaults to ROTATOR_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
