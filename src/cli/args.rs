use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::features::sync::{OperationKind, OperationStatus};

#[derive(Parser)]
#[command(name = "fintrack-sync")]
#[command(about = "Offline operation queue and sync engine for the fintrack finance tracker")]
#[command(long_about = "fintrack-sync - offline queue and sync engine for fintrack

Every mutation is queued durably, online or not, and replayed against the
fintrack API in creation order once the API is reachable. Failed operations
are kept for retry; rejected ones wait for you to retry or clear them.

QUICK START:
  fintrack-sync enqueue create transaction '{\"amount\":\"12.50\"}'
  fintrack-sync status           Show queue counts
  fintrack-sync drain            Replay the queue now
  fintrack-sync watch            Keep syncing in the foreground

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  fintrack-sync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Increase log verbosity (-v debug, -vv trace)
    ///
    /// Logs go to stderr. RUST_LOG takes precedence when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the config file
    #[arg(long, global = true, env = "FINTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bearer token for the fintrack API (overrides `api.token`)
    #[arg(long, global = true, env = "FINTRACK_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a mutation for replay
    ///
    /// The operation is stored durably before this command returns. It is
    /// never sent immediately; run `drain` or `watch` to replay it.
    ///
    /// # Examples
    ///
    ///   fintrack-sync enqueue create transaction '{"amount":"12.50","memo":"Lunch"}'
    ///   fintrack-sync enqueue update category '{"id":"c7","name":"Food"}'
    ///   fintrack-sync enqueue delete transaction '{"id":42}' --id client-42
    #[command(alias = "add")]
    Enqueue {
        /// Operation kind (create, update, delete, bulk-rename)
        kind: OperationKind,

        /// Target entity, e.g. transaction or category
        entity: String,

        /// JSON request body; UPDATE and DELETE need an "id" field
        payload: String,

        /// Caller-generated id; re-enqueueing the same id is a no-op
        #[arg(long)]
        id: Option<String>,
    },

    /// Show queue counts
    ///
    /// Pending includes operations currently executing. A non-zero failed
    /// count is the only state that needs your attention.
    Status,

    /// List queued operations in replay order
    List {
        /// Only operations with this status (pending, in-flight, failed)
        #[arg(long, short = 's')]
        status: Option<OperationStatus>,

        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "50")]
        limit: usize,
    },

    /// Show recently applied operations
    History {
        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Replay the queue against the API now
    ///
    /// Runs one drain pass over every pending and failed operation in
    /// creation order, including ones the API rejected before.
    Drain,

    /// Retry failed operations
    ///
    /// Without an ID, immediately replays every failed operation and reports
    /// how many succeeded. With an ID, only marks that operation pending
    /// again so the next drain picks it up.
    Retry {
        /// Operation to requeue
        id: Option<String>,
    },

    /// Remove every failed operation from the queue
    ///
    /// This cannot be undone. Safe to run when nothing has failed.
    ClearFailed {
        /// Confirm removal
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Delete history entries older than the given age
    PruneHistory {
        /// Age in days
        #[arg(long, default_value = "30")]
        older_than_days: u32,
    },

    /// Check network reachability and API liveness once
    Health,

    /// Keep syncing in the foreground until interrupted
    ///
    /// Probes connectivity and API health on their configured intervals,
    /// drains when the connection comes back and on every sync interval
    /// while online. Stop with Ctrl-C.
    Watch,

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   fintrack-sync completions bash > ~/.bash_completion.d/fintrack-sync
    ///   fintrack-sync completions zsh > ~/.zfunc/_fintrack-sync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enqueue() {
        let cli = Cli::try_parse_from([
            "fintrack-sync",
            "enqueue",
            "bulk-rename",
            "category",
            r#"{"from":"a","to":"b"}"#,
            "--id",
            "k1",
        ])
        .unwrap();

        match cli.command {
            Commands::Enqueue { kind, entity, id, .. } => {
                assert_eq!(kind, OperationKind::BulkRename);
                assert_eq!(entity, "category");
                assert_eq!(id.as_deref(), Some("k1"));
            }
            _ => panic!("expected enqueue"),
        }
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from(["fintrack-sync", "status", "-o", "json", "-vv"]).unwrap();
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["fintrack-sync", "enqueue", "upsert", "x", "{}"]).is_err());
    }

    #[test]
    fn test_list_status_filter() {
        let cli = Cli::try_parse_from(["fintrack-sync", "list", "--status", "in-flight"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::List {
                status: Some(OperationStatus::InFlight),
                ..
            }
        ));
    }
}
