//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! Parsing command-line arguments:
//!
//! ```no_run
//! use clap::Parser;
//! use shutterscout::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Search { query, .. } => { /* run a query */ }
//!     _ => { /* fetch, index, init */ }
//! }
//! ```

use clap::{Parser, Subcommand};

/// Represents the parsed command-line arguments.
///
/// This struct is constructed by parsing the command-line arguments using `clap`.
/// It contains a `command` field that holds the parsed subcommand and its options.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
///
/// Each variant of this enum corresponds to a subcommand that the user can invoke
/// from the command line, along with any options specific to that subcommand.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// The 'search' subcommand: retrieve photos matching a text query and
    /// optionally narrow them with the relevance judge.
    ///
    /// If the consolidated index does not exist yet, the corpus is fetched and
    /// indexed first.
    #[clap(name = "search", alias = "s")]
    Search {
        /// The query describing the picture to search for.
        query: String,

        /// Dataset version to search. Defaults to the configured one.
        #[arg(name = "dataset", short = 'd')]
        dataset: Option<String>,

        /// How many candidates to retrieve by cosine ranking.
        #[arg(name = "count", short = 'k')]
        count: Option<usize>,

        /// How many candidates the judge keeps.
        #[arg(name = "keep", short = 'm')]
        keep: Option<usize>,

        /// Skip the re-ranking pass and show raw retrieval results.
        #[arg(long)]
        no_rerank: bool,
    },

    /// The 'fetch' subcommand: download the photo corpus for a dataset version.
    ///
    /// Already-downloaded photos are skipped, so re-running is cheap.
    #[clap(name = "fetch", alias = "f")]
    Fetch {
        /// Dataset version to fetch. Defaults to the configured one.
        #[arg(name = "dataset", short = 'd')]
        dataset: Option<String>,

        /// Concurrent downloads. Defaults to the configured count.
        #[arg(name = "threads", short = 't')]
        threads: Option<usize>,
    },

    /// The 'index' subcommand: embed downloaded photos and build the
    /// consolidated feature index.
    ///
    /// Batches that already have a shard on disk are skipped, so an
    /// interrupted run resumes where it left off.
    #[clap(name = "index", alias = "x")]
    Index {
        /// Dataset version to index. Defaults to the configured one.
        #[arg(name = "dataset", short = 'd')]
        dataset: Option<String>,

        /// Photos per embedding batch. Defaults to the configured size.
        #[arg(name = "batch-size", short = 'b')]
        batch_size: Option<usize>,
    },

    /// The 'init' subcommand, which takes no arguments and is used for initialization.
    ///
    /// When invoked, this subcommand creates the configuration directory and a
    /// starter `config.yaml` with placeholder credentials.
    Init,
}
