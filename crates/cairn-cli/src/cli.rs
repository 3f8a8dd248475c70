use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "cairn: content-addressed log-structured storage",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding store files (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new empty store and print its name
    New,
    /// Store a file (or stdin) and print its score
    Put(PutArgs),
    /// Write the value stored under a score to stdout
    ///
    /// Opening a store repairs it: a torn trailing record is cut from the
    /// data file and a stale index snapshot is rewritten.
    Get(GetArgs),
    /// Show record count and data size
    ///
    /// Opening a store repairs it: a torn trailing record is cut from the
    /// data file and a stale index snapshot is rewritten.
    Stat(StoreArgs),
    /// Rebuild a store's index from its data file
    Rebuild(StoreArgs),
    /// Remove a store's files
    Delete(StoreArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    pub store: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub store: String,
    /// Input file; `-` or omitted reads stdin
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub store: String,
    pub score: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parses_put_with_globals() {
        let cli = Cli::try_parse_from(["cairn", "--root", "/tmp/s", "put", "abc", "doc.txt"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Command::Put(args) => {
                assert_eq!(args.store, "abc");
                assert_eq!(args.file, Some(PathBuf::from("doc.txt")));
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn get_requires_score() {
        assert!(Cli::try_parse_from(["cairn", "get", "abc"]).is_err());
    }

    #[test]
    fn json_format_flag() {
        let cli = Cli::try_parse_from(["cairn", "stat", "abc", "--format", "json"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn read_commands_mention_repair_on_open() {
        let cmd = Cli::command();
        for name in ["get", "stat"] {
            let sub = cmd.find_subcommand(name).unwrap();
            let long = sub.get_long_about().unwrap().to_string();
            assert!(long.contains("torn trailing record"), "{name}: {long}");
        }
    }
}
