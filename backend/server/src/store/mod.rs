//! # Store
//!
//! Persistence seam shared by every service. Two backends:
//!
//! - [`crate::database::RedisStore`]: production, hashes and lists in Redis
//! - [`memory::MemoryStore`]: single process, used by tests and `STORE=memory`
//!
//! ## Claim commit
//!
//! A claim touches three records: the ledger entry, the tracked user's total and the
//! caller's history list. [`Store::commit_claim`] checks everything that can fail first,
//! then applies the three writes as one unit of work.
//!
//! - Memory store: checks and writes happen under one write lock
//! - Redis: checks run before a `MULTI/EXEC` block. Redis runs the block without
//!   interleaving other clients but does not roll back a command that fails inside it,
//!   which is why nothing that can fail is left for the block
use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Account, AccountId, ClaimEvent, ClaimId, EntityId, TrackedEntity};

pub mod memory;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("Storage backend failure: {0}")]
    Backend(String),

    #[error("Total of {0} would overflow")]
    Overflow(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError>;

    async fn entity(&self, id: EntityId) -> Result<Option<TrackedEntity>, StoreError>;

    /// Insertion order.
    async fn entities_by_owner(&self, owner: AccountId) -> Result<Vec<TrackedEntity>, StoreError>;

    /// Ids with no ledger entry are skipped.
    async fn claims(&self, ids: &[ClaimId]) -> Result<Vec<ClaimEvent>, StoreError>;

    /// Writes the ledger entry, adds its amount to the target's total and appends its id
    /// to the caller's history. Fails with [`StoreError::Overflow`] before writing when the
    /// total would not fit. Returns the target's new total.
    async fn commit_claim(&self, caller: AccountId, claim: &ClaimEvent) -> Result<i64, StoreError>;
}
