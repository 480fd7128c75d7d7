use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "regfile", version, about = "Content-addressed file registry")]
pub struct Cli {
    /// Configuration file (default ~/.regfile)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Fingerprint files and add them to the registry (directories recurse)
    Register {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Group stored with every new entry
        #[arg(short, long)]
        group: Option<String>,
        /// Comment stored with every new entry
        #[arg(short, long)]
        comment: Option<String>,
        /// Fill missing group/comment from per-directory defaults files
        #[arg(short, long)]
        defaults: bool,
        /// Commit policy for this run: auto, confirm or problem
        #[arg(long)]
        commit: Option<String>,
    },
    /// Verify files against the registry without modifying it
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Import MYSUM fingerprint log files
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(short, long)]
        group: Option<String>,
        #[arg(short, long)]
        comment: Option<String>,
        /// Fill missing group/comment from per-directory defaults files
        #[arg(short, long)]
        defaults: bool,
        /// Commit policy for this run: auto, confirm or problem
        #[arg(long)]
        commit: Option<String>,
    },
    /// Update name, group or comment of one registry entry
    Setdata {
        id: u64,
        /// New file name
        name: Option<String>,
        #[arg(short, long)]
        group: Option<String>,
        #[arg(short, long)]
        comment: Option<String>,
        /// Set all three metadata fields, clearing the ones not given
        #[arg(long)]
        all: bool,
    },
    /// Fuzzy search of the registry
    ///
    /// Name, group and comment match case-insensitively; every whitespace
    /// separated word must occur in order.
    Query {
        #[arg(long)]
        id: Option<u64>,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        group: Option<String>,
        #[arg(short, long)]
        comment: Option<String>,
        /// Show group, comment and all digests
        #[arg(short, long)]
        verbose: bool,
        /// Print matches as MYSUM fingerprint lines
        #[arg(long)]
        mysum: bool,
        /// Print matches as ed2k:// links
        #[arg(long)]
        ed2k: bool,
    },
    /// Rebuild the store from the journal (the old store is kept as <db>~)
    Recover {},
    /// Write a defaults file into a directory
    Defaults {
        dir: PathBuf,
        group: String,
        comment: Option<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}
