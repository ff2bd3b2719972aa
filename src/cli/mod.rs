use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Log debug output
    #[clap(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed the news corpus and write the index and metadata files.
    Build {
        /// Corpus CSV. Defaults to index.dataset_path from config.yaml
        #[clap(long)]
        csv: Option<PathBuf>,

        /// Don't draw a progress bar
        #[clap(long, default_value = "false")]
        no_progress: bool,
    },

    /// Query the internal index only
    Search {
        query: String,

        /// Number of results
        #[clap(short)]
        k: Option<usize>,
    },

    /// Search the web and extract articles, skipping the internal index
    Web {
        query: String,

        /// Number of results
        #[clap(short)]
        k: Option<usize>,

        /// Characters kept per article
        #[clap(long)]
        max_chars: Option<usize>,
    },

    /// Route a question: internal index first, web when not confident
    Ask {
        query: String,

        /// Number of results
        #[clap(short)]
        k: Option<usize>,

        /// Characters kept per article
        #[clap(long)]
        max_chars: Option<usize>,
    },

    /// Start the HTTP service
    Serve {
        /// Listen address. Defaults to server.addr from config.yaml
        #[clap(long)]
        addr: Option<String>,
    },
}
