use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flyto-index",
    version,
    about = "Local code intelligence: symbol graph, impact analysis, search",
    after_help = r#"Examples:
  flyto-index scan --root .
  flyto-index impact --root . shop:src/api/users.py:function:get_user
  flyto-index impact --root . get_user --depth 3
  flyto-index references --root . useWallet
  flyto-index search --root . "auth token" --limit 10
  flyto-index file-info --root . src/api/users.py
  flyto-index apis --root .
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan the workspace and update the index.
    Scan {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Extra projects as name=path pairs.
        #[arg(long = "project", value_name = "NAME=PATH")]
        projects: Vec<String>,
        /// Index files ignored by .gitignore too.
        #[arg(long)]
        no_ignore: bool,
        /// Size cap in bytes for indexed files.
        #[arg(long)]
        max_file_bytes: Option<u64>,
    },
    /// Reverse-dependency closure of a symbol.
    Impact {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Symbol id, short id, or bare name.
        symbol: String,
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Every symbol referencing the given one.
    References {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        symbol: String,
    },
    /// Ranked symbol search.
    Search {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the indexed record for one file.
    FileInfo {
        #[arg(long, default_value = ".")]
        root: PathBuf,
        path: String,
    },
    /// All HTTP routes with their joined callers.
    Apis {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}
