//! Service wiring - configuration, tracing, and the public call surface
//!
//! `PledgeService` is the handle a presentation layer holds: it loads
//! configuration, initializes logging, owns the singleton registry, and
//! forwards every call to it.

use std::sync::Arc;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
    PledgeResult,
    error::PledgeError,
    models::{AccountId, Pledge},
    registry::{CreatePledgeRequest, PledgeRegistry, RegistryConfig},
};

/// Configuration for the pledge service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Account credited with the per-creation commission
    pub commission_recipient: AccountId,
    /// Registry configuration
    pub registry: RegistryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            commission_recipient: AccountId::new([0u8; AccountId::LEN]),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from an optional `pledge.toml` file with
    /// `PLEDGE__*` environment overrides (e.g.
    /// `PLEDGE__REGISTRY__COMMISSION_BPS=250`)
    pub fn load() -> PledgeResult<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("pledge").required(false))
            .add_source(Environment::with_prefix("PLEDGE").separator("__"))
            .build()
            .map_err(|err| PledgeError::config(err.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|err| PledgeError::config(err.to_string()))
    }
}

/// Initialize console logging, honoring `RUST_LOG` when set
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Main service handle coordinating the registry
pub struct PledgeService {
    registry: Arc<PledgeRegistry>,
}

impl PledgeService {
    /// Create a service from configuration
    pub fn new(config: ServiceConfig) -> Self {
        info!(
            "Initializing pledge service (commission recipient: {}, commission: {} bps)",
            config.commission_recipient, config.registry.commission_bps
        );
        let registry = Arc::new(PledgeRegistry::new(
            config.commission_recipient,
            config.registry,
        ));
        Self { registry }
    }

    /// Create a service from file and environment configuration
    pub fn from_env() -> PledgeResult<Self> {
        Ok(Self::new(ServiceConfig::load()?))
    }

    /// Shared handle to the underlying registry
    pub fn registry(&self) -> Arc<PledgeRegistry> {
        self.registry.clone()
    }

    /// Create a new pledge from a deposit, returning its handle
    pub async fn create_pledge(&self, request: CreatePledgeRequest) -> PledgeResult<Uuid> {
        self.registry.create_pledge(request).await
    }

    /// Creator asks the pledge's referee to confirm completion
    pub async fn request_approval(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        self.registry.request_approval(handle, caller).await
    }

    /// Referee approves a pending completion request
    pub async fn approve_request(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        self.registry.approve_request(handle, caller).await
    }

    /// Referee rejects a pending completion request
    pub async fn reject_request(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        self.registry.reject_request(handle, caller).await
    }

    /// Referee resolves an open pledge as succeeded
    pub async fn complete_open_pledge(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        self.registry.complete_open_pledge(handle, caller).await
    }

    /// Referee or creator resolves an open pledge as failed
    pub async fn fail_open_pledge(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        self.registry.fail_open_pledge(handle, caller).await
    }

    /// Open pledge handles for a creator
    pub async fn open_pledges_for_creator(&self, creator: AccountId) -> Vec<Uuid> {
        self.registry.open_pledges_for_creator(creator).await
    }

    /// Closed pledge handles for a creator
    pub async fn closed_pledges_for_creator(&self, creator: AccountId) -> Vec<Uuid> {
        self.registry.closed_pledges_for_creator(creator).await
    }

    /// Open pledge handles for a referee
    pub async fn open_pledges_for_referee(&self, referee: AccountId) -> Vec<Uuid> {
        self.registry.open_pledges_for_referee(referee).await
    }

    /// Closed pledge handles for a referee
    pub async fn closed_pledges_for_referee(&self, referee: AccountId) -> Vec<Uuid> {
        self.registry.closed_pledges_for_referee(referee).await
    }

    /// Handles awaiting a referee's approve/reject decision
    pub async fn approval_requests(&self, referee: AccountId) -> Vec<Uuid> {
        self.registry.approval_requests(referee).await
    }

    /// Page through every known creator
    pub async fn user_addresses(&self, offset: usize, count: usize) -> Vec<AccountId> {
        self.registry.user_addresses(offset, count).await
    }

    /// Page through every pledge handle
    pub async fn pledge_handles(&self, offset: usize, count: usize) -> Vec<Uuid> {
        self.registry.pledge_handles(offset, count).await
    }

    /// Number of distinct creators seen so far
    pub async fn number_of_users(&self) -> usize {
        self.registry.number_of_users().await
    }

    /// Number of pledges ever created
    pub async fn number_of_pledges(&self) -> usize {
        self.registry.number_of_pledges().await
    }

    /// Value currently custodied by non-terminal pledges
    pub async fn total_value_held(&self) -> u128 {
        self.registry.total_value_held().await
    }

    /// Snapshot of a pledge by handle
    pub async fn get_pledge(&self, handle: Uuid) -> PledgeResult<Pledge> {
        self.registry.get_pledge(handle).await
    }

    /// Value credited to `account` by resolutions and commissions
    pub async fn balance_of(&self, account: AccountId) -> u128 {
        self.registry.balance_of(account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PledgeStatus;

    fn account(n: u8) -> AccountId {
        AccountId::new([n; AccountId::LEN])
    }

    #[tokio::test]
    async fn service_runs_full_lifecycle() {
        let service = PledgeService::new(ServiceConfig::default());
        let creator = account(1);
        let referee = account(2);

        let handle = service
            .create_pledge(CreatePledgeRequest {
                creator,
                referee,
                name: "Run every morning".to_string(),
                description: "5km before 8am".to_string(),
                failure_recipient: account(3),
                deposit: 1000,
                metadata: None,
            })
            .await
            .unwrap();

        service.request_approval(handle, creator).await.unwrap();
        assert_eq!(service.approval_requests(referee).await, vec![handle]);

        service.approve_request(handle, referee).await.unwrap();
        let pledge = service.get_pledge(handle).await.unwrap();
        assert_eq!(pledge.status, PledgeStatus::Succeeded);
        assert_eq!(service.balance_of(creator).await, 990);
        assert_eq!(service.number_of_pledges().await, 1);
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = ServiceConfig::default();
        assert_eq!(config.registry.commission_bps, 100);
        assert_eq!(
            config.commission_recipient,
            AccountId::new([0u8; AccountId::LEN])
        );
    }
}
