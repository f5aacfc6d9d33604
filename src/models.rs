//! Core data models for the pledge engine
//!
//! Account identities, the pledge status state machine, and the pledge
//! instance itself. A pledge is authoritative only for its own status and
//! custodied balance; all cross-pledge indexing lives in the registry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{PledgeResult, error::PledgeError};

/// Opaque account address: a fixed-width 20-byte identity
///
/// Rendered and parsed as `0x`-prefixed lowercase hex; serialized as that
/// string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; Self::LEN]);

impl AccountId {
    /// Address width in bytes
    pub const LEN: usize = 20;

    /// Build an address from raw bytes
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for AccountId {
    type Err = PledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        if hex.len() != Self::LEN * 2 {
            return Err(PledgeError::invalid_address(format!(
                "expected {} hex characters, got {}",
                Self::LEN * 2,
                hex.len()
            )));
        }
        let mut bytes = [0u8; Self::LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| PledgeError::invalid_address(format!("invalid hex pair {pair:?}")))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Pledge status state machine enum
///
/// The numeric codes are an external contract and must not change:
/// `Open = 0`, `AwaitingApproval = 1`, `Succeeded = 2`, `Failed = 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PledgeStatus {
    /// Funds custodied, commitment in progress
    Open = 0,
    /// Creator has asked the referee to confirm completion
    AwaitingApproval = 1,
    /// Referee confirmed completion, funds released to the creator
    Succeeded = 2,
    /// Commitment failed, funds redirected to the failure recipient
    Failed = 3,
}

impl PledgeStatus {
    /// Check if this is a terminal status (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Check if this status allows direct resolution
    pub fn can_resolve(&self) -> bool {
        matches!(self, Self::Open | Self::AwaitingApproval)
    }

    /// Numeric code exposed to callers
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decode a status from its numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::AwaitingApproval),
            2 => Some(Self::Succeeded),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A release of custodied funds to exactly one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub recipient: AccountId,
    pub amount: u128,
}

/// A single creator/referee escrow agreement
///
/// Parties and metadata are fixed at construction; only `status`,
/// `balance`, and the timestamps change afterwards. The custodied balance
/// equals `amount` until the pledge resolves, then drops to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pledge {
    pub id: Uuid,
    pub name: String,
    pub description: String,

    // Parties
    pub creator: AccountId,
    pub referee: AccountId,
    pub failure_recipient: AccountId,

    // Custody
    pub amount: u128,
    pub balance: u128,
    pub status: PledgeStatus,

    // Metadata
    pub metadata: Option<serde_json::Value>,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Pledge {
    /// Create a new pledge custodying `amount`
    pub fn new(
        creator: AccountId,
        referee: AccountId,
        name: String,
        description: String,
        failure_recipient: AccountId,
        amount: u128,
    ) -> PledgeResult<Self> {
        if amount == 0 {
            return Err(PledgeError::invalid_amount(
                "value must be a positive number",
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description,
            creator,
            referee,
            failure_recipient,
            amount,
            balance: amount,
            status: PledgeStatus::Open,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
        })
    }

    /// Creator asks the referee to confirm completion
    pub fn request_approval(&mut self, caller: AccountId) -> PledgeResult<()> {
        if caller != self.creator {
            return Err(PledgeError::unauthorized(
                caller,
                "only the creator can request completion",
            ));
        }
        if self.status != PledgeStatus::Open {
            return Err(PledgeError::invalid_state(self.id, "Open", self.status));
        }
        self.status = PledgeStatus::AwaitingApproval;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Referee confirms a requested completion, releasing funds to the creator
    pub fn approve(&mut self, caller: AccountId) -> PledgeResult<Payout> {
        if caller != self.referee {
            return Err(PledgeError::unauthorized(
                caller,
                "only the referee can approve a completion request",
            ));
        }
        if self.status != PledgeStatus::AwaitingApproval {
            return Err(PledgeError::invalid_state(
                self.id,
                "AwaitingApproval",
                self.status,
            ));
        }
        Ok(self.settle(PledgeStatus::Succeeded, self.creator))
    }

    /// Referee turns down a requested completion; the pledge reopens
    pub fn reject(&mut self, caller: AccountId) -> PledgeResult<()> {
        if caller != self.referee {
            return Err(PledgeError::unauthorized(
                caller,
                "only the referee can reject a completion request",
            ));
        }
        if self.status != PledgeStatus::AwaitingApproval {
            return Err(PledgeError::invalid_state(
                self.id,
                "AwaitingApproval",
                self.status,
            ));
        }
        self.status = PledgeStatus::Open;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Referee resolves the pledge as succeeded, with or without a pending
    /// completion request
    pub fn complete_direct(&mut self, caller: AccountId) -> PledgeResult<Payout> {
        if caller != self.referee {
            return Err(PledgeError::unauthorized(
                caller,
                "only the referee can complete a pledge",
            ));
        }
        if !self.status.can_resolve() {
            return Err(PledgeError::invalid_state(
                self.id,
                "Open or AwaitingApproval",
                self.status,
            ));
        }
        Ok(self.settle(PledgeStatus::Succeeded, self.creator))
    }

    /// Referee or creator resolves the pledge as failed
    pub fn fail_direct(&mut self, caller: AccountId) -> PledgeResult<Payout> {
        if caller != self.referee && caller != self.creator {
            return Err(PledgeError::unauthorized(
                caller,
                "only the referee or creator can fail a pledge",
            ));
        }
        if !self.status.can_resolve() {
            return Err(PledgeError::invalid_state(
                self.id,
                "Open or AwaitingApproval",
                self.status,
            ));
        }
        Ok(self.settle(PledgeStatus::Failed, self.failure_recipient))
    }

    /// Release the full custodied balance to `recipient` and finalize
    fn settle(&mut self, status: PledgeStatus, recipient: AccountId) -> Payout {
        let payout = Payout {
            recipient,
            amount: self.balance,
        };
        self.balance = 0;
        self.status = status;
        let now = Utc::now();
        self.updated_at = now;
        self.resolved_at = Some(now);
        payout
    }
}
