//! Single-writer task per sale.
//!
//! Every contribution and the resolution of a sale flow through one
//! queue, so acceptance order is the order requests reach the writer and
//! each one is persisted before it is acknowledged:
//!
//! ```text
//! stage (validate, assign sequence) ──► persist row + event ──► commit ──► reply
//! ```

use std::sync::Arc;

use sale_engine::{ContributorId, Receipt, Resolution, Sale, SaleError};
use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::{LaunchpadError, Result};
use crate::events::{EventKind, SaleEvent};

pub enum Command {
    Contribute {
        contributor: ContributorId,
        amount: u64,
        reply: oneshot::Sender<Result<Receipt>>,
    },
    Resolve {
        reply: oneshot::Sender<Result<Arc<Resolution>>>,
    },
}

pub struct WriterState {
    pub pool: SqlitePool,
    pub sale_id: i64,
    pub sale: Arc<Sale>,
}

/// Current wall-clock time in unix seconds.
pub fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Spawn the writer for one sale and return its command queue.
pub fn spawn(state: WriterState, depth: usize, cancel: CancellationToken) -> mpsc::Sender<Command> {
    let (tx, rx) = mpsc::channel(depth);
    tokio::spawn(run(state, rx, cancel));
    tx
}

/// Drain the command queue until it closes or shutdown is requested.
pub async fn run(state: WriterState, mut rx: mpsc::Receiver<Command>, cancel: CancellationToken) {
    info!("Writer starting for sale {}", state.sale_id);

    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Contribute {
                contributor,
                amount,
                reply,
            } => {
                let outcome = contribute(&state, &contributor, amount, now()).await;
                if let Err(e) = &outcome {
                    if e.status().is_server_error() {
                        error!("Sale {} contribution failed: {e}", state.sale_id);
                    }
                }
                // The requester may have gone away; the outcome is already durable.
                let _ = reply.send(outcome);
            }
            Command::Resolve { reply } => {
                let outcome = resolve(&state, now()).await;
                let _ = reply.send(outcome);
            }
        }
    }

    info!("Writer stopped for sale {}", state.sale_id);
}

async fn contribute(
    state: &WriterState,
    contributor: &ContributorId,
    amount: u64,
    now: u64,
) -> Result<Receipt> {
    let staged = state.sale.stage(contributor, amount, now)?;

    let event = SaleEvent::new(
        state.sale_id,
        EventKind::ContributionAccepted,
        now as i64,
    )
    .with_contributor(contributor)
    .with_amount(amount)
    .with_sequence(staged.sequence)
    .with_detail(json!({
        "below_min_at_time_of_contribution": staged.below_min_at_time_of_contribution,
    }));
    db::record_contribution(&state.pool, state.sale_id, &staged, &event).await?;

    let receipt = state.sale.commit(staged).map_err(|e| {
        // Only this task appends, so a persisted row that fails to commit
        // means memory and storage have diverged.
        error!("Sale {} persisted a contribution it could not commit: {e}", state.sale_id);
        LaunchpadError::Sale(SaleError::CorruptHistory(e.to_string()))
    })?;

    info!(
        "Sale {}: accepted {amount} from {contributor} (sequence {})",
        state.sale_id, receipt.sequence
    );
    Ok(receipt)
}

async fn resolve(state: &WriterState, now: u64) -> Result<Arc<Resolution>> {
    let preview = state.sale.preview_resolution(now)?;
    let total_raised = state.sale.snapshot().total_raised;
    let hard_cap = state.sale.config().hard_cap();

    let mut events = vec![SaleEvent::new(state.sale_id, EventKind::SaleResolved, now as i64)
        .with_detail(json!({
            "contributors": preview.records.len(),
            "total_raised": total_raised.to_string(),
        }))];
    if let Some(report) = preview.oversubscription {
        warn!(
            "Sale {} resolved above its hard cap ({} > {}); {} left unallocated",
            state.sale_id, report.total_raised, report.hard_cap, report.unallocated_dust
        );
        events.push(
            SaleEvent::new(state.sale_id, EventKind::OversubscriptionDetected, now as i64)
                .with_amount(report.unallocated_dust)
                .with_detail(json!({
                    "total_raised": report.total_raised.to_string(),
                    "hard_cap": report.hard_cap.to_string(),
                })),
        );
    }

    db::record_resolution(
        &state.pool,
        state.sale_id,
        hard_cap,
        total_raised,
        &preview,
        &events,
    )
    .await?;

    let resolution = state.sale.resolve(now)?;
    if *resolution != preview {
        error!("Sale {} resolved differently from its persisted preview", state.sale_id);
        return Err(SaleError::CorruptHistory(
            "resolution differs from persisted allocations".to_string(),
        )
        .into());
    }
    Ok(resolution)
}
