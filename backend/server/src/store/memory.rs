use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Store, StoreError};
use crate::models::{Account, AccountId, ClaimEvent, ClaimId, EntityId, TrackedEntity};

#[derive(Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    emails: HashMap<String, AccountId>,
    entities: HashMap<EntityId, TrackedEntity>,
    owned: HashMap<AccountId, Vec<EntityId>>,
    claims: HashMap<ClaimId, ClaimEvent>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim_count(&self) -> usize {
        self.tables.read().claims.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        if tables.emails.contains_key(&account.email) {
            return Err(StoreError::Conflict("User"));
        }

        tables.emails.insert(account.email.clone(), account.id);
        tables.accounts.insert(account.id, account.clone());

        Ok(())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.read().accounts.get(&id).cloned())
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read();

        Ok(tables
            .emails
            .get(email)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        tables
            .owned
            .entry(entity.user_id)
            .or_default()
            .push(entity.id);
        tables.entities.insert(entity.id, entity.clone());

        Ok(())
    }

    async fn entity(&self, id: EntityId) -> Result<Option<TrackedEntity>, StoreError> {
        Ok(self.tables.read().entities.get(&id).cloned())
    }

    async fn entities_by_owner(&self, owner: AccountId) -> Result<Vec<TrackedEntity>, StoreError> {
        let tables = self.tables.read();

        Ok(tables
            .owned
            .get(&owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.entities.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn claims(&self, ids: &[ClaimId]) -> Result<Vec<ClaimEvent>, StoreError> {
        let tables = self.tables.read();

        Ok(ids
            .iter()
            .filter_map(|id| tables.claims.get(id))
            .cloned()
            .collect())
    }

    async fn commit_claim(&self, caller: AccountId, claim: &ClaimEvent) -> Result<i64, StoreError> {
        let mut guard = self.tables.write();
        let tables = &mut *guard;

        // check both ends before touching anything
        let entity = tables
            .entities
            .get_mut(&claim.to)
            .ok_or(StoreError::NotFound("User"))?;
        let account = tables
            .accounts
            .get_mut(&caller)
            .ok_or(StoreError::NotFound("Account"))?;

        let total = entity
            .points
            .checked_add(claim.points_claimed)
            .ok_or_else(|| StoreError::Overflow(claim.to.to_string()))?;

        entity.points = total;
        account.history.push(claim.id);

        tables.claims.insert(claim.id, claim.clone());

        Ok(total)
    }
}
