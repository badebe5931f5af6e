//! # History
//!
//! Read side of claims. Joins the caller's history list against the ledger, then each
//! claim against its tracked user.
//!
//! - Newest claim first, by `createdAt`; identical timestamps fall back to history order
//! - `toUser` shows the tracked user as it is now, so every row for one tracked user
//!   carries the same (latest) total
//! - Nothing is written, calling twice without a claim in between gives the same rows
use std::collections::HashMap;

use crate::{
    auth::Caller,
    error::AppError,
    models::{AugmentedClaimEvent, EntitySummary},
    store::Store,
};

pub async fn get_claim_history(
    store: &dyn Store,
    caller: Caller,
) -> Result<Vec<AugmentedClaimEvent>, AppError> {
    let account = store
        .account(caller.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if account.history.is_empty() {
        return Ok(Vec::new());
    }

    let position: HashMap<_, _> = account
        .history
        .iter()
        .enumerate()
        .map(|(index, id)| (*id, index))
        .collect();

    let mut claims = store.claims(&account.history).await?;
    claims.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| position[&b.id].cmp(&position[&a.id]))
    });

    let mut summaries: HashMap<_, Option<EntitySummary>> = HashMap::new();
    let mut rows = Vec::with_capacity(claims.len());

    for claim in claims {
        if !summaries.contains_key(&claim.to) {
            let summary = store.entity(claim.to).await?.map(|entity| EntitySummary {
                name: entity.name,
                points: entity.points,
            });
            summaries.insert(claim.to, summary);
        }

        rows.push(AugmentedClaimEvent {
            id: claim.id,
            points_claimed: claim.points_claimed,
            created_at: claim.created_at,
            to_user: summaries[&claim.to].clone(),
        });
    }

    Ok(rows)
}
