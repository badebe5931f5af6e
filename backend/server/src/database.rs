//! # Redis
//!
//! RAM database.
//!
//! Core purpose is to hold accounts, tracked users and the claim ledger. Also, used for atomic
//! point increments so concurrent claims on one tracked user never lose an award.
//!
//! ## Layout
//!
//! - `account:{id}`: hash (name, email, password_hash, points, created_at)
//! - `account:{id}:history`: list of claim ids, oldest first
//! - `account:{id}:entities`: list of tracked user ids, insertion order
//! - `accounts:email`: hash email -> account id, `HSETNX` keeps emails unique
//! - `entity:{id}`: hash (user_id, name, points)
//! - `claim:{id}`: hash (to, points_claimed, created_at)
//!
//! ## Claims
//!
//! Checks first: tracked user and caller exist, and the new total fits in an `i64`. Then one
//! `MULTI/EXEC` pipeline: write the claim hash, `HINCRBY` the tracked user's points,
//! `RPUSH` onto the caller's history. Redis runs the block without interleaving other
//! clients. It does not roll back a command that fails at runtime inside `EXEC`, so the
//! overflow that would make `HINCRBY` fail is refused before the block is sent.
use std::{collections::HashMap, fmt::Display, str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    models::{Account, AccountId, ClaimEvent, ClaimId, EntityId, TrackedEntity},
    store::{Store, StoreError},
};

const EMAIL_INDEX: &str = "accounts:email";

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_redis(redis_url).await?))
    }
}

fn account_key(id: AccountId) -> String {
    format!("account:{id}")
}

fn history_key(id: AccountId) -> String {
    format!("account:{id}:history")
}

fn owned_key(id: AccountId) -> String {
    format!("account:{id}:entities")
}

fn entity_key(id: EntityId) -> String {
    format!("entity:{id}")
}

fn claim_key(id: ClaimId) -> String {
    format!("claim:{id}")
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn field<'a>(
    key: &str,
    map: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, StoreError> {
    map.get(name).map(String::as_str).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("missing field {name}"),
    })
}

fn parse<T>(key: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("{raw:?}: {e}"),
    })
}

fn parse_field<T>(key: &str, map: &HashMap<String, String>, name: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    parse(key, field(key, map, name)?)
}

fn decode_account(
    id: AccountId,
    map: &HashMap<String, String>,
    history: &[String],
) -> Result<Account, StoreError> {
    let key = account_key(id);

    Ok(Account {
        id,
        name: field(&key, map, "name")?.to_string(),
        email: field(&key, map, "email")?.to_string(),
        password_hash: field(&key, map, "password_hash")?.to_string(),
        points: parse_field(&key, map, "points")?,
        history: history
            .iter()
            .map(|raw| parse(&key, raw))
            .collect::<Result<_, _>>()?,
        created_at: parse_field(&key, map, "created_at")?,
    })
}

fn decode_entity(id: EntityId, map: &HashMap<String, String>) -> Result<TrackedEntity, StoreError> {
    let key = entity_key(id);

    Ok(TrackedEntity {
        id,
        user_id: parse_field(&key, map, "user_id")?,
        name: field(&key, map, "name")?.to_string(),
        points: parse_field(&key, map, "points")?,
    })
}

fn decode_claim(id: ClaimId, map: &HashMap<String, String>) -> Result<ClaimEvent, StoreError> {
    let key = claim_key(id);

    Ok(ClaimEvent {
        id,
        to: parse_field(&key, map, "to")?,
        points_claimed: parse_field(&key, map, "points_claimed")?,
        created_at: parse_field(&key, map, "created_at")?,
    })
}

// initial totals are capped and awards are small, so no claim gets near the limit while
// another is in flight
fn check_headroom(claim: &ClaimEvent, points: i64) -> Result<i64, StoreError> {
    points
        .checked_add(claim.points_claimed)
        .ok_or_else(|| StoreError::Overflow(claim.to.to_string()))
}

#[async_trait]
impl Store for RedisStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();

        let claimed: bool = conn
            .hset_nx(EMAIL_INDEX, &account.email, account.id.to_string())
            .await?;
        if !claimed {
            return Err(StoreError::Conflict("User"));
        }

        redis::pipe()
            .atomic()
            .hset_multiple(
                account_key(account.id),
                &[
                    ("name", account.name.clone()),
                    ("email", account.email.clone()),
                    ("password_hash", account.password_hash.clone()),
                    ("points", account.points.to_string()),
                    ("created_at", timestamp(&account.created_at)),
                ],
            )
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let mut conn = self.connection.clone();

        let (map, history): (HashMap<String, String>, Vec<String>) = redis::pipe()
            .hgetall(account_key(id))
            .lrange(history_key(id), 0, -1)
            .query_async(&mut conn)
            .await?;

        if map.is_empty() {
            return Ok(None);
        }

        decode_account(id, &map, &history).map(Some)
    }

    async fn account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.hget(EMAIL_INDEX, email).await?;

        match raw {
            Some(raw) => self.account(parse(EMAIL_INDEX, &raw)?).await,
            None => Ok(None),
        }
    }

    async fn insert_entity(&self, entity: &TrackedEntity) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();

        redis::pipe()
            .atomic()
            .hset_multiple(
                entity_key(entity.id),
                &[
                    ("user_id", entity.user_id.to_string()),
                    ("name", entity.name.clone()),
                    ("points", entity.points.to_string()),
                ],
            )
            .ignore()
            .rpush(owned_key(entity.user_id), entity.id.to_string())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn entity(&self, id: EntityId) -> Result<Option<TrackedEntity>, StoreError> {
        let mut conn = self.connection.clone();

        let map: HashMap<String, String> = conn.hgetall(entity_key(id)).await?;

        if map.is_empty() {
            return Ok(None);
        }

        decode_entity(id, &map).map(Some)
    }

    async fn entities_by_owner(&self, owner: AccountId) -> Result<Vec<TrackedEntity>, StoreError> {
        let mut conn = self.connection.clone();
        let key = owned_key(owner);

        let raw_ids: Vec<String> = conn.lrange(&key, 0, -1).await?;
        if raw_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = raw_ids
            .iter()
            .map(|raw| parse::<EntityId>(&key, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(entity_key(*id));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        ids.into_iter()
            .zip(maps)
            .filter(|(_, map)| !map.is_empty())
            .map(|(id, map)| decode_entity(id, &map))
            .collect()
    }

    async fn claims(&self, ids: &[ClaimId]) -> Result<Vec<ClaimEvent>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();

        let mut pipe = redis::pipe();
        for id in ids {
            pipe.hgetall(claim_key(*id));
        }
        let maps: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;

        ids.iter()
            .zip(maps)
            .filter(|(_, map)| !map.is_empty())
            .map(|(id, map)| decode_claim(*id, &map))
            .collect()
    }

    async fn commit_claim(&self, caller: AccountId, claim: &ClaimEvent) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();

        // nothing is ever deleted, so a passed check holds through the EXEC below
        let (points, account_exists): (Option<String>, bool) = redis::pipe()
            .hget(entity_key(claim.to), "points")
            .exists(account_key(caller))
            .query_async(&mut conn)
            .await?;
        let Some(points) = points else {
            return Err(StoreError::NotFound("User"));
        };
        if !account_exists {
            return Err(StoreError::NotFound("Account"));
        }
        check_headroom(claim, parse(&entity_key(claim.to), &points)?)?;

        let (total,): (i64,) = redis::pipe()
            .atomic()
            .hset_multiple(
                claim_key(claim.id),
                &[
                    ("to", claim.to.to_string()),
                    ("points_claimed", claim.points_claimed.to_string()),
                    ("created_at", timestamp(&claim.created_at)),
                ],
            )
            .ignore()
            .hincr(entity_key(claim.to), "points", claim.points_claimed)
            .rpush(history_key(caller), claim.id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(total)
    }
}
