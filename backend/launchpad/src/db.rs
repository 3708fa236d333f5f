//! Database layer — migrations, ledger persistence, and event queries.
//!
//! Every write that acknowledges a state change (contribution, resolution,
//! settlement) commits its audit event in the same transaction.

use std::str::FromStr;

use sale_engine::{
    AllocationRecord, Contribution, ContributorId, OversubscriptionReport, Resolution,
    SaleError, SaleParams, SettlementKind,
};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Executor, Sqlite, SqlitePool,
};
use tracing::info;

use crate::errors::Result;
use crate::events::{EventRecord, SaleEvent};
use crate::project::ProjectInfo;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    connect(database_url, 5).await
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

fn parse_amount(field: &str, raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| {
        SaleError::CorruptHistory(format!("{field} is not a u64 amount: {raw:?}")).into()
    })
}

fn parse_contributor(raw: String) -> Result<ContributorId> {
    ContributorId::new(raw)
        .map_err(|e| SaleError::CorruptHistory(format!("stored contributor: {e}")).into())
}

fn parse_settlement_kind(raw: &str) -> Result<SettlementKind> {
    match raw {
        "claim" => Ok(SettlementKind::Claim),
        "refund" => Ok(SettlementKind::Refund),
        other => Err(SaleError::CorruptHistory(format!("unknown settlement kind {other:?}")).into()),
    }
}

// ─────────────────────────────────────────────────────────
// Sales
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SaleRow {
    pub id: i64,
    pub name: String,
    /// JSON-encoded [`SaleParams`].
    pub config: String,
    /// JSON-encoded [`ProjectInfo`]; absent on rows written before it existed.
    pub project: Option<String>,
    pub created_at: i64,
}

impl SaleRow {
    pub fn params(&self) -> Result<SaleParams> {
        Ok(serde_json::from_str(&self.config)?)
    }

    pub fn project(&self) -> Result<ProjectInfo> {
        match &self.project {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(ProjectInfo::default()),
        }
    }
}

/// Register a sale and its creation event. Returns the new sale id.
pub async fn insert_sale(
    pool: &SqlitePool,
    name: &str,
    project: &ProjectInfo,
    params: &SaleParams,
    created_at: i64,
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id = sqlx::query("INSERT INTO sales (name, config, project) VALUES (?1, ?2, ?3)")
        .bind(name)
        .bind(serde_json::to_string(params)?)
        .bind(serde_json::to_string(project)?)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    let event = SaleEvent::new(id, crate::events::EventKind::SaleCreated, created_at)
        .with_detail(serde_json::json!({ "name": name, "symbol": project.symbol }));
    insert_event(&mut *tx, &event).await?;

    tx.commit().await?;
    Ok(id)
}

pub async fn list_sales(pool: &SqlitePool) -> Result<Vec<SaleRow>> {
    let rows = sqlx::query_as::<_, SaleRow>(
        "SELECT id, name, config, project, created_at FROM sales ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Contributions
// ─────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ContributionRow {
    sequence: i64,
    contributor: String,
    amount: String,
    timestamp: i64,
    below_min: bool,
}

/// Persist one contribution together with its acceptance event.
///
/// The `(sale_id, sequence)` primary key rejects duplicates, so a sequence
/// number can never be acknowledged twice.
pub async fn record_contribution(
    pool: &SqlitePool,
    sale_id: i64,
    contribution: &Contribution,
    event: &SaleEvent,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO contributions
            (sale_id, sequence, contributor, amount, timestamp, below_min)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(sale_id)
    .bind(contribution.sequence as i64)
    .bind(contribution.contributor.as_str())
    .bind(contribution.amount.to_string())
    .bind(contribution.timestamp as i64)
    .bind(contribution.below_min_at_time_of_contribution)
    .execute(&mut *tx)
    .await?;
    insert_event(&mut *tx, event).await?;
    tx.commit().await?;
    Ok(())
}

/// Load a sale's ledger ordered by sequence.
pub async fn load_contributions(pool: &SqlitePool, sale_id: i64) -> Result<Vec<Contribution>> {
    let rows = sqlx::query_as::<_, ContributionRow>(
        r#"
        SELECT sequence, contributor, amount, timestamp, below_min
        FROM   contributions
        WHERE  sale_id = ?1
        ORDER  BY sequence ASC
        "#,
    )
    .bind(sale_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(Contribution {
                contributor: parse_contributor(row.contributor)?,
                amount: parse_amount("contribution amount", &row.amount)?,
                timestamp: row.timestamp as u64,
                sequence: row.sequence as u64,
                below_min_at_time_of_contribution: row.below_min,
            })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct ResolutionRow {
    resolved_at: i64,
    total_raised: String,
    oversubscribed: bool,
    unallocated_dust: String,
}

#[derive(sqlx::FromRow)]
struct AllocationRow {
    contributor: String,
    contributed: String,
    tokens_allocated: String,
    refund_amount: String,
}

/// Persist a resolution, its allocation records and events atomically.
pub async fn record_resolution(
    pool: &SqlitePool,
    sale_id: i64,
    hard_cap: u64,
    total_raised: u64,
    resolution: &Resolution,
    events: &[SaleEvent],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let dust = resolution
        .oversubscription
        .map(|r| r.unallocated_dust)
        .unwrap_or(0);
    sqlx::query(
        r#"
        INSERT INTO resolutions
            (sale_id, resolved_at, total_raised, oversubscribed, unallocated_dust)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(sale_id)
    .bind(resolution.resolved_at as i64)
    .bind(total_raised.to_string())
    .bind(total_raised > hard_cap)
    .bind(dust.to_string())
    .execute(&mut *tx)
    .await?;

    for (position, record) in resolution.records.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO allocations
                (sale_id, position, contributor, contributed, tokens_allocated, refund_amount)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(sale_id)
        .bind(position as i64)
        .bind(record.contributor.as_str())
        .bind(record.contributed.to_string())
        .bind(record.tokens_allocated.to_string())
        .bind(record.refund_amount.to_string())
        .execute(&mut *tx)
        .await?;
    }

    for event in events {
        insert_event(&mut *tx, event).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Load a stored resolution, if the sale has been resolved.
pub async fn load_resolution(
    pool: &SqlitePool,
    sale_id: i64,
    hard_cap: u64,
) -> Result<Option<Resolution>> {
    let Some(row) = sqlx::query_as::<_, ResolutionRow>(
        r#"
        SELECT resolved_at, total_raised, oversubscribed, unallocated_dust
        FROM   resolutions
        WHERE  sale_id = ?1
        "#,
    )
    .bind(sale_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(None);
    };

    let allocations = sqlx::query_as::<_, AllocationRow>(
        r#"
        SELECT contributor, contributed, tokens_allocated, refund_amount
        FROM   allocations
        WHERE  sale_id = ?1
        ORDER  BY position ASC
        "#,
    )
    .bind(sale_id)
    .fetch_all(pool)
    .await?;

    let records = allocations
        .into_iter()
        .map(|row| {
            Ok(AllocationRecord {
                contributor: parse_contributor(row.contributor)?,
                contributed: parse_amount("contributed", &row.contributed)?,
                tokens_allocated: parse_amount("tokens_allocated", &row.tokens_allocated)?,
                refund_amount: parse_amount("refund_amount", &row.refund_amount)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let oversubscription = if row.oversubscribed {
        Some(OversubscriptionReport {
            total_raised: parse_amount("total_raised", &row.total_raised)?,
            hard_cap,
            unallocated_dust: parse_amount("unallocated_dust", &row.unallocated_dust)?,
        })
    } else {
        None
    };

    Ok(Some(Resolution {
        resolved_at: row.resolved_at as u64,
        records,
        oversubscription,
    }))
}

// ─────────────────────────────────────────────────────────
// Settlements
// ─────────────────────────────────────────────────────────

/// Result of trying to persist a claim or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementWrite {
    Recorded,
    /// The contributor already has a settlement of this kind on record.
    AlreadySettled(SettlementKind),
}

/// Persist a settlement unless the contributor already has one.
///
/// The `(sale_id, contributor)` primary key makes this the durable
/// check-and-set: of two concurrent requests only one row lands.
pub async fn record_settlement(
    pool: &SqlitePool,
    sale_id: i64,
    contributor: &ContributorId,
    kind: SettlementKind,
    amount: u64,
    event: &SaleEvent,
) -> Result<SettlementWrite> {
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO settlements (sale_id, contributor, kind, amount, settled_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(sale_id)
    .bind(contributor.as_str())
    .bind(kind.as_str())
    .bind(amount.to_string())
    .bind(event.timestamp)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        let (existing,): (String,) = sqlx::query_as(
            "SELECT kind FROM settlements WHERE sale_id = ?1 AND contributor = ?2",
        )
        .bind(sale_id)
        .bind(contributor.as_str())
        .fetch_one(&mut *tx)
        .await?;
        return Ok(SettlementWrite::AlreadySettled(parse_settlement_kind(
            &existing,
        )?));
    }

    insert_event(&mut *tx, event).await?;
    tx.commit().await?;
    Ok(SettlementWrite::Recorded)
}

pub async fn load_settlements(
    pool: &SqlitePool,
    sale_id: i64,
) -> Result<Vec<(ContributorId, SettlementKind)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT contributor, kind
        FROM   settlements
        WHERE  sale_id = ?1
        ORDER  BY settled_at ASC, contributor ASC
        "#,
    )
    .bind(sale_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(contributor, kind)| {
            Ok((parse_contributor(contributor)?, parse_settlement_kind(&kind)?))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────

async fn insert_event<'e, E>(executor: E, event: &SaleEvent) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO events
            (sale_id, event_type, contributor, amount, sequence, detail, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(event.sale_id)
    .bind(&event.event_type)
    .bind(&event.contributor)
    .bind(&event.amount)
    .bind(event.sequence)
    .bind(&event.detail)
    .bind(event.timestamp)
    .execute(executor)
    .await?;
    Ok(())
}

/// Fetch all events for a sale, oldest first.
pub async fn get_events_for_sale(pool: &SqlitePool, sale_id: i64) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query_as::<_, EventRecord>(
        r#"
        SELECT id, sale_id, event_type, contributor, amount, sequence, detail,
               timestamp, created_at
        FROM   events
        WHERE  sale_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(sale_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
