//! # Claims
//!
//! Awarding points to a tracked user.
//!
//! ## Flow
//! 1. Caller picks a tracked user through `?to=<id>`
//! 2. Tracked user and caller must both exist, otherwise nothing is written
//! 3. Draw an award, uniform over 1 to 10
//! 4. Ledger entry, tracked user total and caller history are committed together
//! 5. The new ledger entry goes back to the caller
//!
//! ## Ownership
//! Any authenticated caller may award any tracked user, including ones owned by other
//! accounts. Such claims only get a debug line.
use chrono::Utc;
use rand::Rng;
use tracing::debug;

use crate::{
    auth::Caller,
    error::AppError,
    models::{ClaimEvent, ClaimId, EntityId},
    store::Store,
};

pub const MIN_AWARD: i64 = 1;
pub const MAX_AWARD: i64 = 10;

/// Where award amounts come from.
pub trait AwardSource: Send + Sync {
    fn draw(&self) -> i64;
}

pub struct UniformAward;

impl AwardSource for UniformAward {
    fn draw(&self) -> i64 {
        rand::thread_rng().gen_range(MIN_AWARD..=MAX_AWARD)
    }
}

pub async fn claim_points(
    store: &dyn Store,
    award: &dyn AwardSource,
    caller: Caller,
    to: Option<&str>,
) -> Result<ClaimEvent, AppError> {
    let to = to.map(str::trim).filter(|to| !to.is_empty()).ok_or_else(|| {
        AppError::BadRequest("Please select a user to award points to".to_string())
    })?;
    let to: EntityId = to
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid user id: {to}")))?;

    let target = store
        .entity(to)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if target.user_id != caller.account_id {
        debug!(
            "Account {} claiming for {} owned by {}",
            caller.account_id, target.id, target.user_id
        );
    }

    let points_claimed = award.draw();
    if !(MIN_AWARD..=MAX_AWARD).contains(&points_claimed) {
        return Err(AppError::InternalError(format!(
            "Award {points_claimed} outside {MIN_AWARD}..={MAX_AWARD}"
        )));
    }

    let claim = ClaimEvent {
        id: ClaimId::new(),
        to,
        points_claimed,
        created_at: Utc::now(),
    };

    let total = store.commit_claim(caller.account_id, &claim).await?;

    debug!(
        "Claim {} awarded {points_claimed} to {}, total now {total}",
        claim.id, claim.to
    );

    Ok(claim)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::VecDeque, sync::Arc};

    use parking_lot::Mutex;

    use super::*;
    use async_trait::async_trait;

    use crate::{
        models::{Account, AccountId, TrackedEntity},
        store::{StoreError, memory::MemoryStore},
    };

    /// Hands out a fixed sequence of awards.
    pub(crate) struct ScriptedAward(Mutex<VecDeque<i64>>);

    impl ScriptedAward {
        pub(crate) fn new(awards: impl IntoIterator<Item = i64>) -> Self {
            Self(Mutex::new(awards.into_iter().collect()))
        }
    }

    impl AwardSource for ScriptedAward {
        fn draw(&self) -> i64 {
            self.0.lock().pop_front().unwrap_or(MIN_AWARD)
        }
    }

    /// Every call fails the way an unreachable backend does.
    pub(crate) struct FailingStore;

    fn unreachable_backend() -> StoreError {
        StoreError::Backend("connection refused".to_string())
    }

    #[async_trait]
    impl Store for FailingStore {
        async fn insert_account(&self, _: &Account) -> Result<(), StoreError> {
            Err(unreachable_backend())
        }

        async fn account(&self, _: AccountId) -> Result<Option<Account>, StoreError> {
            Err(unreachable_backend())
        }

        async fn account_by_email(&self, _: &str) -> Result<Option<Account>, StoreError> {
            Err(unreachable_backend())
        }

        async fn insert_entity(&self, _: &TrackedEntity) -> Result<(), StoreError> {
            Err(unreachable_backend())
        }

        async fn entity(&self, _: EntityId) -> Result<Option<TrackedEntity>, StoreError> {
            Err(unreachable_backend())
        }

        async fn entities_by_owner(&self, _: AccountId) -> Result<Vec<TrackedEntity>, StoreError> {
            Err(unreachable_backend())
        }

        async fn claims(&self, _: &[ClaimId]) -> Result<Vec<ClaimEvent>, StoreError> {
            Err(unreachable_backend())
        }

        async fn commit_claim(&self, _: AccountId, _: &ClaimEvent) -> Result<i64, StoreError> {
            Err(unreachable_backend())
        }
    }

    pub(crate) async fn seed_account(store: &MemoryStore) -> Caller {
        let account = Account {
            id: AccountId::new(),
            name: "owner".to_string(),
            email: format!("{}@example.com", AccountId::new()),
            password_hash: String::new(),
            points: 0,
            history: Vec::new(),
            created_at: Utc::now(),
        };
        store.insert_account(&account).await.unwrap();

        Caller {
            account_id: account.id,
        }
    }

    pub(crate) async fn seed_entity(
        store: &MemoryStore,
        owner: Caller,
        name: &str,
        points: i64,
    ) -> EntityId {
        let entity = TrackedEntity {
            id: EntityId::new(),
            user_id: owner.account_id,
            name: name.to_string(),
            points,
        };
        store.insert_entity(&entity).await.unwrap();

        entity.id
    }

    #[tokio::test]
    async fn test_scripted_claims_accumulate() {
        let store = MemoryStore::new();
        let award = ScriptedAward::new([3, 7, 2]);
        let caller = seed_account(&store).await;
        let target = seed_entity(&store, caller, "E", 0).await;
        let to = target.to_string();

        let mut amounts = Vec::new();
        for _ in 0..3 {
            let claim = claim_points(&store, &award, caller, Some(to.as_str())).await.unwrap();
            assert_eq!(claim.to, target);
            amounts.push(claim.points_claimed);
        }

        assert_eq!(amounts, [3, 7, 2]);
        assert_eq!(store.entity(target).await.unwrap().unwrap().points, 12);
        assert_eq!(store.claim_count(), 3);

        let account = store.account(caller.account_id).await.unwrap().unwrap();
        assert_eq!(account.history.len(), 3);
        assert_eq!(account.points, 0);
    }

    #[tokio::test]
    async fn test_uniform_awards_stay_in_range() {
        let store = MemoryStore::new();
        let caller = seed_account(&store).await;
        let target = seed_entity(&store, caller, "E", 5).await;
        let to = target.to_string();

        let mut sum = 0;
        for _ in 0..200 {
            let claim = claim_points(&store, &UniformAward, caller, Some(to.as_str()))
                .await
                .unwrap();
            assert!((MIN_AWARD..=MAX_AWARD).contains(&claim.points_claimed));
            sum += claim.points_claimed;
        }

        assert_eq!(store.entity(target).await.unwrap().unwrap().points, 5 + sum);

        let account = store.account(caller.account_id).await.unwrap().unwrap();
        let ledger = store.claims(&account.history).await.unwrap();
        assert_eq!(ledger.len(), 200);
        assert_eq!(ledger.iter().map(|c| c.points_claimed).sum::<i64>(), sum);
    }

    #[tokio::test]
    async fn test_missing_target_is_bad_request() {
        let store = MemoryStore::new();
        let caller = seed_account(&store).await;

        for to in [None, Some(""), Some("   ")] {
            let result = claim_points(&store, &UniformAward, caller, to).await;
            assert!(matches!(result, Err(AppError::BadRequest(_))));
        }

        let result = claim_points(&store, &UniformAward, caller, Some("not-an-id")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_store_failure_is_internal_error() {
        let to = EntityId::new().to_string();

        let result = claim_points(
            &FailingStore,
            &UniformAward,
            Caller {
                account_id: AccountId::new(),
            },
            Some(to.as_str()),
        )
        .await;

        assert!(matches!(result, Err(AppError::InternalError(_))));
    }

    #[tokio::test]
    async fn test_overflowing_total_writes_nothing() {
        let store = MemoryStore::new();
        let caller = seed_account(&store).await;
        let target = seed_entity(&store, caller, "E", i64::MAX - 2).await;

        let award = ScriptedAward::new([5]);
        let to = target.to_string();
        let result = claim_points(&store, &award, caller, Some(to.as_str())).await;

        assert!(matches!(result, Err(AppError::InternalError(_))));
        assert_eq!(store.claim_count(), 0);
        assert_eq!(store.entity(target).await.unwrap().unwrap().points, i64::MAX - 2);
        assert!(
            store
                .account(caller.account_id)
                .await
                .unwrap()
                .unwrap()
                .history
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_unknown_target_writes_nothing() {
        let store = MemoryStore::new();
        let caller = seed_account(&store).await;
        let existing = seed_entity(&store, caller, "E", 4).await;
        let ghost = EntityId::new().to_string();

        let result = claim_points(&store, &UniformAward, caller, Some(ghost.as_str())).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.claim_count(), 0);
        assert_eq!(store.entity(existing).await.unwrap().unwrap().points, 4);
        assert!(
            store
                .account(caller.account_id)
                .await
                .unwrap()
                .unwrap()
                .history
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_unknown_caller_writes_nothing() {
        let store = MemoryStore::new();
        let owner = seed_account(&store).await;
        let target = seed_entity(&store, owner, "E", 4).await;
        let stranger = Caller {
            account_id: AccountId::new(),
        };

        let to = target.to_string();
        let result = claim_points(&store, &UniformAward, stranger, Some(to.as_str())).await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.claim_count(), 0);
        assert_eq!(store.entity(target).await.unwrap().unwrap().points, 4);
    }

    #[tokio::test]
    async fn test_out_of_range_award_rejected() {
        let store = MemoryStore::new();
        let caller = seed_account(&store).await;
        let target = seed_entity(&store, caller, "E", 0).await;

        let award = ScriptedAward::new([11]);
        let to = target.to_string();
        let result = claim_points(&store, &award, caller, Some(to.as_str())).await;

        assert!(matches!(result, Err(AppError::InternalError(_))));
        assert_eq!(store.claim_count(), 0);
    }

    #[tokio::test]
    async fn test_other_accounts_entities_can_be_claimed() {
        let store = MemoryStore::new();
        let owner = seed_account(&store).await;
        let other = seed_account(&store).await;
        let target = seed_entity(&store, owner, "E", 0).await;

        let award = ScriptedAward::new([6]);
        let to = target.to_string();
        let claim = claim_points(&store, &award, other, Some(to.as_str()))
            .await
            .unwrap();

        assert_eq!(claim.points_claimed, 6);
        assert_eq!(
            store.account(other.account_id).await.unwrap().unwrap().history,
            vec![claim.id]
        );
        assert!(
            store
                .account(owner.account_id)
                .await
                .unwrap()
                .unwrap()
                .history
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_concurrent_claims_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let caller = seed_account(&store).await;
        let target = seed_entity(&store, caller, "E", 0).await;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                let to = target.to_string();
                tokio::spawn(async move {
                    claim_points(store.as_ref(), &UniformAward, caller, Some(to.as_str()))
                        .await
                        .unwrap()
                        .points_claimed
                })
            })
            .collect();

        let mut sum = 0;
        for handle in handles {
            sum += handle.await.unwrap();
        }

        assert_eq!(store.entity(target).await.unwrap().unwrap().points, sum);
        assert_eq!(
            store.account(caller.account_id).await.unwrap().unwrap().history.len(),
            32
        );
    }
}
