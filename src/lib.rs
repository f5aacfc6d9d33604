//! Value escrow for self-declared commitments
//!
//! A creator locks a sum of value against a commitment of their own
//! choosing. A designated referee either confirms completion, releasing the
//! funds back to the creator, or fails the pledge, redirecting them to a
//! pre-agreed failure recipient. The registry creates and indexes every
//! pledge, runs the request-completion / approve-or-reject workflow, and
//! charges a commission per creation.

pub mod error;
pub mod ledger;
pub mod models;
pub mod registry;
pub mod service;

use error::PledgeError;

/// Result type alias for pledge operations
pub type PledgeResult<T> = Result<T, PledgeError>;
