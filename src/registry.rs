//! Pledge registry - creates, indexes, and resolves pledges
//!
//! The registry is the only way pledges come into existence. It charges a
//! commission per creation, keeps open/closed handle lists per creator and
//! per referee plus a pending-approval queue per referee, and relocates
//! every index entry atomically with the instance's own status transition.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    PledgeResult,
    error::PledgeError,
    ledger::Ledger,
    models::{AccountId, Payout, Pledge},
};

/// Configuration for the registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Commission taken from each deposit, in basis points
    pub commission_bps: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            commission_bps: 100, // 1%
        }
    }
}

/// Pledge creation request
#[derive(Debug, Clone)]
pub struct CreatePledgeRequest {
    pub creator: AccountId,
    pub referee: AccountId,
    pub name: String,
    pub description: String,
    pub failure_recipient: AccountId,
    pub deposit: u128,
    pub metadata: Option<serde_json::Value>,
}

/// Open and closed pledge handles for one party
#[derive(Debug, Clone, Default)]
struct PartyIndex {
    open: Vec<Uuid>,
    closed: Vec<Uuid>,
}

/// Everything the registry tracks, guarded as one unit so a transition and
/// its index relocations commit together
#[derive(Debug, Default)]
struct RegistryState {
    pledges: HashMap<Uuid, Pledge>,
    /// Every handle, in creation order
    handles: Vec<Uuid>,
    /// Every distinct creator, in order of first appearance
    users: Vec<AccountId>,
    creators: HashMap<AccountId, PartyIndex>,
    referees: HashMap<AccountId, PartyIndex>,
    approval_queues: HashMap<AccountId, Vec<Uuid>>,
    /// Value currently custodied by non-terminal pledges
    total_value_held: u128,
    ledger: Ledger,
}

impl RegistryState {
    /// Commit a terminal transition: credit the payout, release the held
    /// value, relocate open -> closed for both parties, drop any pending
    /// approval entry, and store the resolved pledge.
    ///
    /// Every slot is located before the first mutation, so a broken index
    /// surfaces as an error with the registry untouched rather than a
    /// silent no-op or a half-applied move.
    fn close_pledge(&mut self, pledge: Pledge, payout: Payout) -> PledgeResult<()> {
        let handle = pledge.id;
        let creator = pledge.creator;
        let referee = pledge.referee;

        let creator_pos = self
            .creators
            .get(&creator)
            .and_then(|index| index.open.iter().position(|h| *h == handle))
            .ok_or_else(|| {
                PledgeError::internal(format!("pledge {handle} missing from creator open index"))
            })?;
        let referee_pos = self
            .referees
            .get(&referee)
            .and_then(|index| index.open.iter().position(|h| *h == handle))
            .ok_or_else(|| {
                PledgeError::internal(format!("pledge {handle} missing from referee open index"))
            })?;
        let queue_pos = self
            .approval_queues
            .get(&referee)
            .and_then(|queue| queue.iter().position(|h| *h == handle));
        let remaining = self
            .total_value_held
            .checked_sub(payout.amount)
            .ok_or_else(|| PledgeError::internal("total value held underflow"))?;

        self.ledger.apply(payout)?;
        self.total_value_held = remaining;
        if let Some(index) = self.creators.get_mut(&creator) {
            index.open.remove(creator_pos);
            index.closed.push(handle);
        }
        if let Some(index) = self.referees.get_mut(&referee) {
            index.open.remove(referee_pos);
            index.closed.push(handle);
        }
        if let (Some(pos), Some(queue)) = (queue_pos, self.approval_queues.get_mut(&referee)) {
            queue.remove(pos);
        }
        self.pledges.insert(handle, pledge);
        Ok(())
    }

    fn queued_for(&self, referee: AccountId, handle: Uuid) -> bool {
        self.approval_queues
            .get(&referee)
            .is_some_and(|queue| queue.contains(&handle))
    }
}

/// Registry of every pledge, one per deployment
pub struct PledgeRegistry {
    config: RegistryConfig,
    /// Account credited with the per-creation commission
    commission_recipient: AccountId,
    state: Arc<RwLock<RegistryState>>,
}

impl PledgeRegistry {
    /// Create a registry with a fixed commission recipient
    pub fn new(commission_recipient: AccountId, config: RegistryConfig) -> Self {
        Self {
            config,
            commission_recipient,
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    /// Account receiving the per-creation commission
    pub fn commission_recipient(&self) -> AccountId {
        self.commission_recipient
    }

    /// Create a new pledge from a deposit, deducting the commission
    ///
    /// The commission is credited to the commission recipient and the
    /// remainder becomes the pledge's custodied amount. Returns the new
    /// pledge's handle.
    pub async fn create_pledge(&self, request: CreatePledgeRequest) -> PledgeResult<Uuid> {
        info!("Creating pledge: {}", request.name);

        if request.deposit == 0 {
            return Err(PledgeError::invalid_amount(
                "value must be a positive number",
            ));
        }
        let commission = request
            .deposit
            .checked_mul(u128::from(self.config.commission_bps))
            .ok_or_else(|| PledgeError::invalid_amount("deposit overflows commission arithmetic"))?
            / 10_000;
        let amount = request.deposit - commission;
        if amount == 0 {
            return Err(PledgeError::invalid_amount(
                "deposit is fully consumed by commission",
            ));
        }

        let mut pledge = Pledge::new(
            request.creator,
            request.referee,
            request.name,
            request.description,
            request.failure_recipient,
            amount,
        )?;
        pledge.metadata = request.metadata;
        let handle = pledge.id;

        let mut state = self.state.write().await;
        let total = state
            .total_value_held
            .checked_add(amount)
            .ok_or_else(|| PledgeError::internal("total value held overflow"))?;
        state.ledger.credit(self.commission_recipient, commission)?;

        state.total_value_held = total;
        if !state.creators.contains_key(&request.creator) {
            state.users.push(request.creator);
        }
        state
            .creators
            .entry(request.creator)
            .or_default()
            .open
            .push(handle);
        state
            .referees
            .entry(request.referee)
            .or_default()
            .open
            .push(handle);
        state.handles.push(handle);
        state.pledges.insert(handle, pledge);

        info!(
            "Created pledge: {} (creator: {}, referee: {}, amount: {}, commission: {})",
            handle, request.creator, request.referee, amount, commission
        );

        Ok(handle)
    }

    /// Creator asks the pledge's referee to confirm completion
    ///
    /// On success the handle joins the referee's pending-approval queue.
    pub async fn request_approval(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        let mut state = self.state.write().await;
        let referee = {
            let pledge = state
                .pledges
                .get_mut(&handle)
                .ok_or_else(|| PledgeError::not_found(handle, "registry"))?;
            pledge.request_approval(caller)?;
            pledge.referee
        };
        state.approval_queues.entry(referee).or_default().push(handle);

        info!("Requested approval for pledge: {} (referee: {})", handle, referee);

        Ok(())
    }

    /// Referee approves a pending completion request
    ///
    /// The handle must sit in the calling referee's pending-approval queue.
    /// Releases the custodied balance to the creator and closes the pledge
    /// for both parties.
    pub async fn approve_request(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        let mut state = self.state.write().await;
        if !state.queued_for(caller, handle) {
            return Err(PledgeError::not_found(handle, "approval queue"));
        }

        let mut pledge = state
            .pledges
            .get(&handle)
            .cloned()
            .ok_or_else(|| PledgeError::not_found(handle, "registry"))?;
        let payout = pledge.approve(caller)?;
        state.close_pledge(pledge, payout)?;

        info!("Approved pledge: {} (released {} to creator)", handle, payout.amount);

        Ok(())
    }

    /// Referee rejects a pending completion request; the pledge reopens
    pub async fn reject_request(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        let mut state = self.state.write().await;
        let queue_pos = state
            .approval_queues
            .get(&caller)
            .and_then(|queue| queue.iter().position(|h| *h == handle))
            .ok_or_else(|| PledgeError::not_found(handle, "approval queue"))?;

        {
            let pledge = state
                .pledges
                .get_mut(&handle)
                .ok_or_else(|| PledgeError::not_found(handle, "registry"))?;
            pledge.reject(caller)?;
        }
        if let Some(queue) = state.approval_queues.get_mut(&caller) {
            queue.remove(queue_pos);
        }

        info!("Rejected approval request for pledge: {}", handle);

        Ok(())
    }

    /// Referee resolves an open pledge as succeeded
    pub async fn complete_open_pledge(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        let mut state = self.state.write().await;
        let mut pledge = state
            .pledges
            .get(&handle)
            .cloned()
            .ok_or_else(|| PledgeError::not_found(handle, "registry"))?;
        let payout = pledge.complete_direct(caller)?;
        state.close_pledge(pledge, payout)?;

        info!("Completed pledge: {} (released {} to creator)", handle, payout.amount);

        Ok(())
    }

    /// Referee or creator resolves an open pledge as failed
    pub async fn fail_open_pledge(&self, handle: Uuid, caller: AccountId) -> PledgeResult<()> {
        let mut state = self.state.write().await;
        let mut pledge = state
            .pledges
            .get(&handle)
            .cloned()
            .ok_or_else(|| PledgeError::not_found(handle, "registry"))?;
        let payout = pledge.fail_direct(caller)?;
        state.close_pledge(pledge, payout)?;

        info!(
            "Failed pledge: {} (released {} to failure recipient)",
            handle, payout.amount
        );

        Ok(())
    }

    /// Open pledge handles for a creator
    pub async fn open_pledges_for_creator(&self, creator: AccountId) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .creators
            .get(&creator)
            .map(|index| index.open.clone())
            .unwrap_or_default()
    }

    /// Closed pledge handles for a creator
    pub async fn closed_pledges_for_creator(&self, creator: AccountId) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .creators
            .get(&creator)
            .map(|index| index.closed.clone())
            .unwrap_or_default()
    }

    /// Open pledge handles for a referee
    pub async fn open_pledges_for_referee(&self, referee: AccountId) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .referees
            .get(&referee)
            .map(|index| index.open.clone())
            .unwrap_or_default()
    }

    /// Closed pledge handles for a referee
    pub async fn closed_pledges_for_referee(&self, referee: AccountId) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .referees
            .get(&referee)
            .map(|index| index.closed.clone())
            .unwrap_or_default()
    }

    /// Handles awaiting a referee's approve/reject decision
    pub async fn approval_requests(&self, referee: AccountId) -> Vec<Uuid> {
        let state = self.state.read().await;
        state
            .approval_queues
            .get(&referee)
            .cloned()
            .unwrap_or_default()
    }

    /// Page through every known creator, in order of first appearance
    pub async fn user_addresses(&self, offset: usize, count: usize) -> Vec<AccountId> {
        let state = self.state.read().await;
        page(&state.users, offset, count)
    }

    /// Page through every pledge handle, in creation order
    pub async fn pledge_handles(&self, offset: usize, count: usize) -> Vec<Uuid> {
        let state = self.state.read().await;
        page(&state.handles, offset, count)
    }

    /// Number of distinct creators seen so far
    pub async fn number_of_users(&self) -> usize {
        self.state.read().await.users.len()
    }

    /// Number of pledges ever created
    pub async fn number_of_pledges(&self) -> usize {
        self.state.read().await.handles.len()
    }

    /// Value currently custodied by non-terminal pledges
    pub async fn total_value_held(&self) -> u128 {
        self.state.read().await.total_value_held
    }

    /// Snapshot of a pledge by handle
    pub async fn get_pledge(&self, handle: Uuid) -> PledgeResult<Pledge> {
        self.state
            .read()
            .await
            .pledges
            .get(&handle)
            .cloned()
            .ok_or_else(|| PledgeError::not_found(handle, "registry"))
    }

    /// Value credited to `account` by resolutions and commissions
    pub async fn balance_of(&self, account: AccountId) -> u128 {
        self.state.read().await.ledger.balance_of(account)
    }
}

fn page<T: Clone>(items: &[T], offset: usize, count: usize) -> Vec<T> {
    items.iter().skip(offset).take(count).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PledgeStatus;

    fn account(n: u8) -> AccountId {
        AccountId::new([n; AccountId::LEN])
    }

    fn registry() -> PledgeRegistry {
        // Default commission: 100 bps, so a 1000 deposit custodies 990.
        PledgeRegistry::new(account(9), RegistryConfig::default())
    }

    fn request(creator: AccountId, referee: AccountId, deposit: u128) -> CreatePledgeRequest {
        CreatePledgeRequest {
            creator,
            referee,
            name: "Drink water everyday".to_string(),
            description: "I must drink three litres of water everyday".to_string(),
            failure_recipient: account(3),
            deposit,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn create_indexes_pledge_for_both_parties() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);

        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        assert_eq!(registry.open_pledges_for_creator(creator).await, vec![handle]);
        assert_eq!(registry.open_pledges_for_referee(referee).await, vec![handle]);
        assert!(registry.closed_pledges_for_creator(creator).await.is_empty());
        assert!(registry.closed_pledges_for_referee(referee).await.is_empty());
        assert_eq!(registry.number_of_pledges().await, 1);
        assert_eq!(registry.number_of_users().await, 1);

        let pledge = registry.get_pledge(handle).await.unwrap();
        assert_eq!(pledge.status, PledgeStatus::Open);
        assert_eq!(pledge.amount, 990);
        assert_eq!(pledge.balance, 990);

        assert_eq!(registry.total_value_held().await, 990);
        assert_eq!(registry.balance_of(registry.commission_recipient()).await, 10);
    }

    #[tokio::test]
    async fn distinct_creators_counted_once() {
        let registry = registry();
        registry
            .create_pledge(request(account(1), account(2), 1000))
            .await
            .unwrap();
        registry
            .create_pledge(request(account(1), account(2), 1000))
            .await
            .unwrap();
        assert_eq!(registry.number_of_users().await, 1);
        assert_eq!(registry.open_pledges_for_creator(account(1)).await.len(), 2);

        registry
            .create_pledge(request(account(4), account(2), 1000))
            .await
            .unwrap();
        assert_eq!(registry.number_of_users().await, 2);
        assert_eq!(
            registry.user_addresses(0, 10).await,
            vec![account(1), account(4)]
        );
    }

    #[tokio::test]
    async fn complete_moves_handle_to_closed_for_both_parties() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        registry.complete_open_pledge(handle, referee).await.unwrap();

        assert!(registry.open_pledges_for_creator(creator).await.is_empty());
        assert!(registry.open_pledges_for_referee(referee).await.is_empty());
        assert_eq!(registry.closed_pledges_for_creator(creator).await, vec![handle]);
        assert_eq!(registry.closed_pledges_for_referee(referee).await, vec![handle]);

        let pledge = registry.get_pledge(handle).await.unwrap();
        assert_eq!(pledge.status.code(), 2);
        assert_eq!(pledge.balance, 0);

        assert_eq!(registry.balance_of(creator).await, 990);
        assert_eq!(registry.total_value_held().await, 0);
    }

    #[tokio::test]
    async fn request_approve_flow() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        registry.request_approval(handle, creator).await.unwrap();
        let pledge = registry.get_pledge(handle).await.unwrap();
        assert_eq!(pledge.status.code(), 1);
        assert_eq!(registry.approval_requests(referee).await, vec![handle]);

        registry.approve_request(handle, referee).await.unwrap();
        assert!(registry.approval_requests(referee).await.is_empty());
        assert_eq!(registry.closed_pledges_for_creator(creator).await, vec![handle]);
        assert_eq!(registry.closed_pledges_for_referee(referee).await, vec![handle]);
        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 2);
        assert_eq!(registry.balance_of(creator).await, 990);
    }

    #[tokio::test]
    async fn reject_reopens_and_allows_another_request() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        registry.request_approval(handle, creator).await.unwrap();
        registry.reject_request(handle, referee).await.unwrap();

        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 0);
        assert!(registry.approval_requests(referee).await.is_empty());
        assert_eq!(registry.open_pledges_for_creator(creator).await, vec![handle]);
        assert_eq!(registry.open_pledges_for_referee(referee).await, vec![handle]);
        assert_eq!(registry.total_value_held().await, 990);

        registry.request_approval(handle, creator).await.unwrap();
        assert_eq!(registry.approval_requests(referee).await, vec![handle]);
    }

    #[tokio::test]
    async fn creator_cannot_complete() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        let err = registry
            .complete_open_pledge(handle, creator)
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized { .. }));

        assert_eq!(registry.open_pledges_for_creator(creator).await, vec![handle]);
        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 0);
        assert_eq!(registry.total_value_held().await, 990);
        assert_eq!(registry.balance_of(creator).await, 0);
    }

    #[tokio::test]
    async fn creator_can_fail_their_own_pledge() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        registry.fail_open_pledge(handle, creator).await.unwrap();

        let pledge = registry.get_pledge(handle).await.unwrap();
        assert_eq!(pledge.status.code(), 3);
        assert_eq!(registry.balance_of(account(3)).await, 990);
        assert_eq!(registry.closed_pledges_for_creator(creator).await, vec![handle]);
    }

    #[tokio::test]
    async fn stranger_cannot_fail() {
        let registry = registry();
        let handle = registry
            .create_pledge(request(account(1), account(2), 1000))
            .await
            .unwrap();

        let err = registry
            .fail_open_pledge(handle, account(7))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::Unauthorized { .. }));
        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 0);
    }

    #[tokio::test]
    async fn zero_deposit_is_rejected() {
        let registry = registry();
        let err = registry
            .create_pledge(request(account(1), account(2), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::InvalidAmount { .. }));
        assert_eq!(registry.number_of_pledges().await, 0);
        assert_eq!(registry.number_of_users().await, 0);
        assert_eq!(registry.total_value_held().await, 0);
    }

    #[tokio::test]
    async fn deposit_fully_consumed_by_commission_is_rejected() {
        let registry = PledgeRegistry::new(
            account(9),
            RegistryConfig {
                commission_bps: 10_000,
            },
        );
        let err = registry
            .create_pledge(request(account(1), account(2), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::InvalidAmount { .. }));
        assert_eq!(registry.balance_of(account(9)).await, 0);
    }

    #[tokio::test]
    async fn approve_requires_queued_handle() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        // Nothing requested yet.
        let err = registry.approve_request(handle, referee).await.unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));

        // Requested, but the caller is not the pledge's referee, so the
        // handle is absent from their queue.
        registry.request_approval(handle, creator).await.unwrap();
        let err = registry
            .approve_request(handle, account(7))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));
        let err = registry
            .reject_request(handle, account(7))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));

        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 1);
    }

    #[tokio::test]
    async fn direct_resolution_clears_pending_queue() {
        let registry = registry();
        let creator = account(1);
        let referee = account(2);
        let handle = registry
            .create_pledge(request(creator, referee, 1000))
            .await
            .unwrap();

        registry.request_approval(handle, creator).await.unwrap();
        registry.fail_open_pledge(handle, referee).await.unwrap();

        assert!(registry.approval_requests(referee).await.is_empty());
        assert_eq!(registry.get_pledge(handle).await.unwrap().status.code(), 3);
        assert_eq!(registry.balance_of(account(3)).await, 990);
    }

    #[tokio::test]
    async fn terminal_pledge_cannot_be_resolved_again() {
        let registry = registry();
        let referee = account(2);
        let handle = registry
            .create_pledge(request(account(1), referee, 1000))
            .await
            .unwrap();

        registry.complete_open_pledge(handle, referee).await.unwrap();

        let err = registry
            .complete_open_pledge(handle, referee)
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::InvalidState { .. }));
        let err = registry.fail_open_pledge(handle, referee).await.unwrap_err();
        assert!(matches!(err, PledgeError::InvalidState { .. }));
        let err = registry
            .request_approval(handle, account(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::InvalidState { .. }));

        // Funds released exactly once.
        assert_eq!(registry.balance_of(account(1)).await, 990);
    }

    #[tokio::test]
    async fn unknown_handle_is_not_found() {
        let registry = registry();
        let missing = Uuid::new_v4();

        let err = registry
            .request_approval(missing, account(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));
        let err = registry
            .complete_open_pledge(missing, account(2))
            .await
            .unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));
        let err = registry.get_pledge(missing).await.unwrap_err();
        assert!(matches!(err, PledgeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn global_listings_paginate_in_creation_order() {
        let registry = registry();
        let mut handles = Vec::new();
        for n in 1..=3 {
            handles.push(
                registry
                    .create_pledge(request(account(n), account(10), 1000))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(registry.pledge_handles(0, 3).await, handles);
        assert_eq!(registry.pledge_handles(1, 2).await, handles[1..].to_vec());
        assert!(registry.pledge_handles(3, 5).await.is_empty());

        assert_eq!(registry.user_addresses(0, 2).await.len(), 2);
        assert_eq!(registry.user_addresses(2, 2).await, vec![account(3)]);
        assert!(registry.user_addresses(10, 1).await.is_empty());
    }
}
