use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppError;
use crate::models::event::PickupEvent;
use crate::observability::metrics::Metrics;
use crate::store::accounting::{AccountingLookup, HttpAccounting, InMemoryAccounting};
use crate::store::blobs::{BlobStore, FsBlobStore, InMemoryBlobStore};
use crate::store::directory::{CustomerDirectory, InMemoryDirectory, RoleLookup};
use crate::store::records::{InMemoryPickupStore, PickupStore};

const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(3);

pub struct AppState {
    pub pickups: Arc<dyn PickupStore>,
    pub signatures: Arc<dyn BlobStore>,
    pub accounting: Arc<dyn AccountingLookup>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub roles: Arc<dyn RoleLookup>,
    pub events_tx: broadcast::Sender<PickupEvent>,
    pub metrics: Metrics,
    pub sync_timeout: Duration,
}

impl AppState {
    /// Fully in-memory state; collaborators can be swapped with the `with_*`
    /// methods.
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let directory = Arc::new(InMemoryDirectory::new());

        Self {
            pickups: Arc::new(InMemoryPickupStore::new()),
            signatures: Arc::new(InMemoryBlobStore::default()),
            accounting: Arc::new(InMemoryAccounting::new()),
            customers: directory.clone(),
            roles: directory,
            events_tx,
            metrics: Metrics::new(),
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let directory = Arc::new(InMemoryDirectory::new());
        for (identity, role) in &config.user_roles {
            directory.assign_role(*identity, *role);
        }
        debug!(users = config.user_roles.len(), "seeded role lookup");

        let mut state = Self::new(config.event_buffer_size)
            .with_directory(directory)
            .with_sync_timeout(config.accounting_timeout);

        if let Some(base_url) = &config.accounting_base_url {
            let accounting = HttpAccounting::new(
                base_url,
                config.accounting_token.as_deref(),
                config.accounting_timeout,
            )?;
            state = state.with_accounting(Arc::new(accounting));
            info!(accounting_url = %base_url, "using http accounting lookup");
        }

        state = match &config.signature_dir {
            Some(dir) => state.with_signatures(Arc::new(FsBlobStore::new(
                dir.clone(),
                config.signature_url_ttl,
            ))),
            None => state.with_signatures(Arc::new(InMemoryBlobStore::new(
                config.signature_url_ttl,
            ))),
        };
        info!(
            signature_backend = state.signatures.backend_tag(),
            "signature store ready"
        );

        Ok(state)
    }

    pub fn with_pickups(mut self, pickups: Arc<dyn PickupStore>) -> Self {
        self.pickups = pickups;
        self
    }

    pub fn with_signatures(mut self, signatures: Arc<dyn BlobStore>) -> Self {
        self.signatures = signatures;
        self
    }

    pub fn with_accounting(mut self, accounting: Arc<dyn AccountingLookup>) -> Self {
        self.accounting = accounting;
        self
    }

    pub fn with_directory(mut self, directory: Arc<InMemoryDirectory>) -> Self {
        self.customers = directory.clone();
        self.roles = directory;
        self
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Nobody listening is not an error.
    pub fn publish(&self, event: PickupEvent) {
        let _ = self.events_tx.send(event);
    }
}
