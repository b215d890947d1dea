//! Command-line interface. With no subcommand the HTTP server starts.

mod commands;

use clap::{Parser, Subcommand};

/// Animeverse - anime metadata backend
#[derive(Parser)]
#[command(name = "animeverse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the background scheduler
    #[command(alias = "daemon")]
    Serve,

    /// Resolve one anime by ID or name, importing it if needed
    #[command(alias = "r")]
    Resolve {
        #[arg(required = true)]
        identifier: Vec<String>,
    },

    /// Free-text search over the canonical catalog
    #[command(alias = "s")]
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        /// Show relevance scores instead of tiered results
        #[arg(long)]
        ranked: bool,
    },

    /// Bulk import the offline dataset
    ImportDataset {
        /// Download the dataset even if a local copy exists
        #[arg(long)]
        refresh: bool,
    },

    /// Fill missing year/season on canonical records
    Backfill,

    /// Refresh the current season's titles
    UpdateSeason,

    /// Queue image upgrades for records with low-quality artwork
    UpgradeImages {
        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Run the scheduled maintenance jobs once and exit
    Maintenance,

    /// Create default config file
    #[command(alias = "init-config", alias = "--init")]
    Init,
}

pub use commands::*;
