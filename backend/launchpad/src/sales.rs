//! Registry of live sale instances.
//!
//! Each sale is an isolated [`Sale`] with its own writer task. On startup
//! the registry replays every sale from the database, so sequence numbers,
//! allocations and settlements resume exactly where they were acknowledged.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use sale_engine::{
    ContributorId, KycOracle, Receipt, Resolution, Sale, SaleConfig, SaleError, SaleParams,
    SettlementEvent, SettlementKind,
};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::db::{self, SettlementWrite};
use crate::errors::{LaunchpadError, Result};
use crate::events::SaleEvent;
use crate::kyc::KycRegistry;
use crate::project::ProjectInfo;
use crate::writer::{self, Command, WriterState};

pub struct SaleHandle {
    pub id: i64,
    pub name: String,
    pub project: ProjectInfo,
    pub sale: Arc<Sale>,
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for SaleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaleHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl SaleHandle {
    async fn submit<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| LaunchpadError::WriterUnavailable(self.id))?;
        rx.await
            .map_err(|_| LaunchpadError::WriterUnavailable(self.id))?
    }

    pub async fn contribute(&self, contributor: ContributorId, amount: u64) -> Result<Receipt> {
        self.submit(|reply| Command::Contribute {
            contributor,
            amount,
            reply,
        })
        .await
    }

    pub async fn resolve(&self) -> Result<Arc<Resolution>> {
        self.submit(|reply| Command::Resolve { reply }).await
    }
}

pub struct SaleRegistry {
    pool: SqlitePool,
    kyc: Arc<KycRegistry>,
    queue_depth: usize,
    cancel: CancellationToken,
    sales: RwLock<BTreeMap<i64, Arc<SaleHandle>>>,
}

impl SaleRegistry {
    /// Restore every persisted sale and start its writer.
    pub async fn load(
        pool: SqlitePool,
        kyc: Arc<KycRegistry>,
        queue_depth: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let registry = Self {
            pool,
            kyc,
            queue_depth,
            cancel,
            sales: RwLock::new(BTreeMap::new()),
        };

        for row in db::list_sales(&registry.pool).await? {
            let config = SaleConfig::new(row.params()?).map_err(|e| {
                SaleError::CorruptHistory(format!("sale {} has an invalid config: {e}", row.id))
            })?;
            let project = row.project()?;
            let history = db::load_contributions(&registry.pool, row.id).await?;
            let resolution = db::load_resolution(&registry.pool, row.id, config.hard_cap()).await?;
            let settlements = db::load_settlements(&registry.pool, row.id).await?;

            info!(
                "Restoring sale {} ({}): {} contributions, resolved={}, {} settlements",
                row.id,
                row.name,
                history.len(),
                resolution.is_some(),
                settlements.len()
            );
            let sale = Sale::restore(config, registry.oracle(), history, resolution, settlements)?;
            registry.insert(row.id, row.name, project, sale);
        }

        Ok(registry)
    }

    fn oracle(&self) -> Arc<dyn KycOracle> {
        self.kyc.clone()
    }

    fn insert(&self, id: i64, name: String, project: ProjectInfo, sale: Sale) -> Arc<SaleHandle> {
        let sale = Arc::new(sale);
        let commands = writer::spawn(
            WriterState {
                pool: self.pool.clone(),
                sale_id: id,
                sale: Arc::clone(&sale),
            },
            self.queue_depth,
            self.cancel.child_token(),
        );
        let handle = Arc::new(SaleHandle {
            id,
            name,
            project,
            sale,
            commands,
        });
        self.sales
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&handle));
        handle
    }

    pub async fn create(
        &self,
        name: &str,
        project: ProjectInfo,
        params: SaleParams,
    ) -> Result<Arc<SaleHandle>> {
        let project = project.validated()?;
        let config = SaleConfig::new(params)?;
        let id = db::insert_sale(
            &self.pool,
            name,
            &project,
            config.params(),
            writer::now() as i64,
        )
        .await?;
        info!("Created sale {id} ({name}, {})", project.symbol);
        Ok(self.insert(
            id,
            name.to_string(),
            project,
            Sale::new(config, self.oracle()),
        ))
    }

    pub fn get(&self, id: i64) -> Result<Arc<SaleHandle>> {
        self.sales
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| LaunchpadError::NotFound(format!("sale {id}")))
    }

    pub fn list(&self) -> Vec<Arc<SaleHandle>> {
        self.sales
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Refresh KYC when the sale needs it, then queue the contribution.
    pub async fn contribute(
        &self,
        id: i64,
        contributor: ContributorId,
        amount: u64,
    ) -> Result<Receipt> {
        let handle = self.get(id)?;
        if handle.sale.config().kyc_required() {
            self.kyc.refresh(&contributor).await?;
        }
        handle.contribute(contributor, amount).await
    }

    pub async fn resolve(&self, id: i64) -> Result<Arc<Resolution>> {
        self.get(id)?.resolve().await
    }

    /// Claim or refund for one contributor.
    ///
    /// The settlements table arbitrates concurrent duplicates durably; the
    /// in-memory transition only follows a row that actually landed.
    pub async fn settle(
        &self,
        id: i64,
        contributor: &ContributorId,
        kind: SettlementKind,
    ) -> Result<SettlementEvent> {
        let handle = self.get(id)?;
        let amount = handle.sale.check_settlement(contributor, kind)?;

        let now = writer::now() as i64;
        let event = SaleEvent::settlement(
            id,
            &SettlementEvent {
                contributor: contributor.clone(),
                kind,
                amount,
            },
            now,
        );
        match db::record_settlement(&self.pool, id, contributor, kind, amount, &event).await? {
            SettlementWrite::Recorded => Ok(handle.sale.settle(contributor, kind)?),
            SettlementWrite::AlreadySettled(SettlementKind::Claim) => {
                Err(SaleError::AlreadyClaimed.into())
            }
            SettlementWrite::AlreadySettled(SettlementKind::Refund) => {
                Err(SaleError::AlreadyRefunded.into())
            }
        }
    }
}
