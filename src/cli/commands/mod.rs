//! Command implementations for fintrack-sync.
//!
//! Every command returns the text to print; `main` does the printing.

mod completions;
mod queue;
mod sync;

pub use completions::completions;
pub use queue::{clear_failed, enqueue, history, list, prune_history, requeue, status};
pub use sync::{drain, health, retry_failed, watch};

use crate::cli::args::Commands;
use crate::cli::Context;
use crate::error::FintrackError;

/// Execute a parsed command.
///
/// # Errors
///
/// Returns whatever error the command produced.
pub async fn run(ctx: &Context, command: Commands) -> Result<String, FintrackError> {
    let format = ctx.format;

    match command {
        Commands::Completions { shell } => completions(shell),
        Commands::Health => health(ctx).await,
        Commands::Enqueue {
            kind,
            entity,
            payload,
            id,
        } => enqueue(&*ctx.open_queue()?, kind, &entity, &payload, id, format),
        Commands::Status => status(&*ctx.open_queue()?, format),
        Commands::List { status, limit } => list(&*ctx.open_queue()?, status, limit, format),
        Commands::History { limit } => history(&*ctx.open_queue()?, limit, format),
        Commands::PruneHistory { older_than_days } => {
            prune_history(&*ctx.open_queue()?, older_than_days, format)
        }
        Commands::ClearFailed { force } => clear_failed(&*ctx.open_queue()?, force, format),
        Commands::Retry { id: Some(id) } => requeue(&*ctx.open_queue()?, &id, format),
        Commands::Retry { id: None } => retry_failed(ctx, ctx.open_queue()?).await,
        Commands::Drain => drain(ctx, ctx.open_queue()?).await,
        Commands::Watch => watch(ctx, ctx.open_queue()?).await,
    }
}
