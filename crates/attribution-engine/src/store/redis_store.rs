//! Redis storage for the attribution engine
//!
//! Key layout:
//! - `user:{id}` JSON, `users:email:{email}` -> id, `users:all` set of ids
//! - `asset:{kind}:{id}` JSON, `asset:code:{kind}:{code}` -> id, `assets:{kind}` set of ids
//! - `attribution:{id}` JSON, `attributions:all` sorted set scored by id
//! - `attributions:item:{kind}:{id}` set of attribution ids referencing the asset
//! - `active:{kind}:{id}` -> id of the ACTIVE attribution holding the asset
//! - `history:{id}` JSON, `history:item:{kind}:{id}` and `history:user:{id}` lists of ids
//! - `seq:{name}` counters, `lock:{kind}:{id}` advisory locks

use anyhow::Context;
use assets_common::{AssetKind, AssetRef, AttributionId, Error, Result, UserId};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{code_key, email_key, Sequence, Store, UnitOfWork};
use crate::models::{Asset, AssignmentHistory, Attribution, User};

/// Checks every claim against the active index, then applies the claims and
/// the staged commands. Nothing is written when a claim does not match.
const COMMIT_SCRIPT: &str = r#"
local payload = cjson.decode(ARGV[1])
for _, claim in ipairs(payload.claims) do
    local current = redis.call('GET', claim[1]) or ''
    if current ~= claim[2] then
        return redis.error_reply('CLAIM_MISMATCH ' .. claim[1])
    end
end
for _, claim in ipairs(payload.claims) do
    if claim[3] == '' then
        redis.call('DEL', claim[1])
    else
        redis.call('SET', claim[1], claim[3])
    end
end
for _, op in ipairs(payload.ops) do
    redis.call(unpack(op))
end
return #payload.ops
"#;

/// KEYS: unique index, record, membership set. ARGV: id, JSON.
const INSERT_UNIQUE_SCRIPT: &str = r#"
if redis.call('SETNX', KEYS[1], ARGV[1]) == 0 then
    return 0
end
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SADD', KEYS[3], ARGV[1])
return 1
"#;

const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn storage(e: RedisError) -> Error {
    Error::Storage(e.to_string())
}

fn decode<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|data| serde_json::from_str(&data))
        .transpose()
        .map_err(Error::from)
}

fn asset_key(asset: AssetRef) -> String {
    format!("asset:{}", asset.key())
}

fn active_key(asset: AssetRef) -> String {
    format!("active:{}", asset.key())
}

fn lock_key(asset: AssetRef) -> String {
    format!("lock:{}", asset.key())
}

fn item_attributions_key(asset: AssetRef) -> String {
    format!("attributions:item:{}", asset.key())
}

fn item_history_key(asset: AssetRef) -> String {
    format!("history:item:{}", asset.key())
}

fn user_history_key(user: UserId) -> String {
    format!("history:user:{}", user)
}

#[derive(Serialize)]
struct CommitPayload {
    claims: Vec<[String; 3]>,
    ops: Vec<Vec<String>>,
}

/// Redis-backed [`Store`]
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(storage)?;
        decode(raw)
    }

    /// MGET the given keys, skipping the ones that no longer exist
    async fn load_many<T: DeserializeOwned>(&self, keys: Vec<String>) -> Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(storage)?;

        let mut items = Vec::with_capacity(raw.len());
        for entry in raw {
            if let Some(item) = decode(entry)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn insert_unique(
        &self,
        index_key: String,
        record_key: String,
        set_key: String,
        id: u64,
        json: String,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let inserted: i64 = Script::new(INSERT_UNIQUE_SCRIPT)
            .key(index_key)
            .key(record_key)
            .key(set_key)
            .arg(id)
            .arg(json)
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;
        Ok(inserted == 1)
    }

    async fn history_from_list(&self, list_key: String) -> Result<Vec<AssignmentHistory>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.lrange(&list_key, 0, -1).await.map_err(storage)?;
        self.load_many(ids.into_iter().map(|id| format!("history:{}", id)).collect())
            .await
    }

    /// Translate a unit of work into claim checks and plain commands
    async fn build_payload(&self, unit: &UnitOfWork) -> Result<CommitPayload> {
        let claims = unit
            .claims()
            .iter()
            .map(|claim| {
                [
                    active_key(claim.asset),
                    claim.expected.map(|id| id.to_string()).unwrap_or_default(),
                    claim.holder.map(|id| id.to_string()).unwrap_or_default(),
                ]
            })
            .collect();

        let mut ops: Vec<Vec<String>> = Vec::new();

        for attribution in unit.attributions() {
            let id = attribution.id().to_string();
            ops.push(vec![
                "SET".into(),
                format!("attribution:{}", id),
                serde_json::to_string(attribution)?,
            ]);
            ops.push(vec![
                "ZADD".into(),
                "attributions:all".into(),
                id.clone(),
                id.clone(),
            ]);
            for asset in attribution.assets() {
                ops.push(vec!["SADD".into(), item_attributions_key(asset), id.clone()]);
            }
        }

        for removed in unit.removals() {
            let id = removed.to_string();
            // the record may have been staged in this unit or stored earlier
            let assets = match unit.attributions().iter().find(|a| a.id() == *removed) {
                Some(staged) => staged.assets(),
                None => self
                    .attribution(*removed)
                    .await?
                    .map(|stored| stored.assets())
                    .unwrap_or_default(),
            };
            ops.push(vec!["DEL".into(), format!("attribution:{}", id)]);
            ops.push(vec!["ZREM".into(), "attributions:all".into(), id.clone()]);
            for asset in assets {
                ops.push(vec!["SREM".into(), item_attributions_key(asset), id.clone()]);
            }
        }

        for asset in unit.assets() {
            ops.push(vec![
                "SET".into(),
                asset_key(asset.asset_ref()),
                serde_json::to_string(asset)?,
            ]);
        }

        for entry in unit.history() {
            let id = entry.id.to_string();
            ops.push(vec![
                "SET".into(),
                format!("history:{}", id),
                serde_json::to_string(entry)?,
            ]);
            ops.push(vec!["RPUSH".into(), item_history_key(entry.asset()), id.clone()]);
            let mut users: Vec<UserId> = entry
                .from_user_id
                .into_iter()
                .chain(entry.to_user_id)
                .collect();
            users.dedup();
            for user in users {
                ops.push(vec!["RPUSH".into(), user_history_key(user), id.clone()]);
            }
        }

        Ok(CommitPayload { claims, ops })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn user(&self, id: UserId) -> Result<Option<User>> {
        self.load(&format!("user:{}", id)).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.conn.clone();
        let id: Option<u64> = conn
            .get(format!("users:email:{}", email_key(email)))
            .await
            .map_err(storage)?;
        match id {
            Some(id) => self.user(UserId(id)).await,
            None => Ok(None),
        }
    }

    async fn users(&self) -> Result<Vec<User>> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<u64> = conn.smembers("users:all").await.map_err(storage)?;
        ids.sort_unstable();
        self.load_many(ids.into_iter().map(|id| format!("user:{}", id)).collect())
            .await
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        self.insert_unique(
            format!("users:email:{}", email_key(&user.email)),
            format!("user:{}", user.id),
            "users:all".to_string(),
            user.id.get(),
            serde_json::to_string(user)?,
        )
        .await
    }

    async fn asset(&self, asset: AssetRef) -> Result<Option<Asset>> {
        self.load(&asset_key(asset)).await
    }

    async fn asset_by_code(&self, kind: AssetKind, code: &str) -> Result<Option<Asset>> {
        let mut conn = self.conn.clone();
        let id: Option<u64> = conn
            .get(format!("asset:code:{}:{}", kind.as_str(), code_key(code)))
            .await
            .map_err(storage)?;
        match id {
            Some(id) => self.asset(AssetRef { kind, id }).await,
            None => Ok(None),
        }
    }

    async fn assets(&self, kind: AssetKind) -> Result<Vec<Asset>> {
        let mut conn = self.conn.clone();
        let mut ids: Vec<u64> = conn
            .smembers(format!("assets:{}", kind.as_str()))
            .await
            .map_err(storage)?;
        ids.sort_unstable();
        self.load_many(
            ids.into_iter()
                .map(|id| asset_key(AssetRef { kind, id }))
                .collect(),
        )
        .await
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<bool> {
        let asset_ref = asset.asset_ref();
        self.insert_unique(
            format!(
                "asset:code:{}:{}",
                asset_ref.kind.as_str(),
                code_key(asset.code())
            ),
            asset_key(asset_ref),
            format!("assets:{}", asset_ref.kind.as_str()),
            asset_ref.id,
            serde_json::to_string(asset)?,
        )
        .await
    }

    async fn attribution(&self, id: AttributionId) -> Result<Option<Attribution>> {
        self.load(&format!("attribution:{}", id)).await
    }

    async fn attributions(&self) -> Result<Vec<Attribution>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn
            .zrange("attributions:all", 0, -1)
            .await
            .map_err(storage)?;
        self.load_many(
            ids.into_iter()
                .map(|id| format!("attribution:{}", id))
                .collect(),
        )
        .await
    }

    async fn active_attribution(&self, asset: AssetRef) -> Result<Option<Attribution>> {
        let mut conn = self.conn.clone();
        let id: Option<u64> = conn.get(active_key(asset)).await.map_err(storage)?;
        match id {
            Some(id) => self.attribution(AttributionId(id)).await,
            None => Ok(None),
        }
    }

    async fn count_active_attributions(&self, asset: AssetRef) -> Result<usize> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn
            .smembers(item_attributions_key(asset))
            .await
            .map_err(storage)?;
        let records: Vec<Attribution> = self
            .load_many(
                ids.into_iter()
                    .map(|id| format!("attribution:{}", id))
                    .collect(),
            )
            .await?;
        Ok(records
            .iter()
            .filter(|a| a.is_active() && a.holds(asset))
            .count())
    }

    async fn history_for_item(&self, asset: AssetRef) -> Result<Vec<AssignmentHistory>> {
        self.history_from_list(item_history_key(asset)).await
    }

    async fn history_for_user(&self, user: UserId) -> Result<Vec<AssignmentHistory>> {
        self.history_from_list(user_history_key(user)).await
    }

    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.incr(format!("seq:{}", sequence.as_str()), 1u64)
            .await
            .map_err(storage)
    }

    async fn try_lock(&self, asset: AssetRef, token: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET NX PX replies OK when the lock was taken, nil when it is held
        let reply: Option<String> = redis::cmd("SET")
            .arg(lock_key(asset))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(storage)?;
        Ok(reply.is_some())
    }

    async fn unlock(&self, asset: AssetRef, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(UNLOCK_SCRIPT)
            .key(lock_key(asset))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;
        if released == 0 {
            warn!("Lock on {} expired before it was released", asset);
        }
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        if unit.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_string(&self.build_payload(&unit).await?)?;

        let mut conn = self.conn.clone();
        let result: std::result::Result<i64, RedisError> = Script::new(COMMIT_SCRIPT)
            .arg(payload)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(applied) => {
                debug!("Committed {} ({} commands)", unit.operation(), applied);
                Ok(())
            }
            Err(e) if e.to_string().contains("CLAIM_MISMATCH") => {
                debug!("Rejected {} commit: {}", unit.operation(), e);
                Err(Error::Conflict(
                    "asset was claimed by another attribution".to_string(),
                ))
            }
            Err(e) => Err(storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phone;
    use assets_common::{PhoneId, Role, UserStatus};

    const TEST_REDIS_URL: &str = "redis://127.0.0.1:6379/15";

    async fn fresh_store() -> RedisStore {
        let store = RedisStore::connect(TEST_REDIS_URL).await.unwrap();
        let mut conn = store.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_insert_user_enforces_unique_email() {
        let store = fresh_store().await;
        let user = User {
            id: UserId(1),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: Role::Assigner,
            department: "IT".to_string(),
            status: UserStatus::Active,
        };
        assert!(store.insert_user(&user).await.unwrap());

        let duplicate = User {
            id: UserId(2),
            email: "ANA@example.com".to_string(),
            ..user.clone()
        };
        assert!(!store.insert_user(&duplicate).await.unwrap());
        assert_eq!(store.user_by_email("ana@example.com").await.unwrap(), Some(user));
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_commit_claim_mismatch_writes_nothing() {
        let store = fresh_store().await;
        let phone = Asset::Phone(Phone::new(
            PhoneId(1),
            "Apple".to_string(),
            "iPhone 15".to_string(),
            "353918110012345".to_string(),
        ));
        assert!(store.insert_asset(&phone).await.unwrap());
        let asset_ref = phone.asset_ref();

        let mut first = UnitOfWork::new("test");
        first.claim(asset_ref, None, Some(AttributionId(1)));
        store.commit(first).await.unwrap();

        let mut stale = UnitOfWork::new("test");
        let mut taken = phone.clone();
        taken.assign(UserId(5), chrono::Utc::now().date_naive());
        stale.save_asset(taken);
        stale.claim(asset_ref, None, Some(AttributionId(2)));
        let err = store.commit(stale).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        assert!(store.asset(asset_ref).await.unwrap().unwrap().is_available());
    }

    #[tokio::test]
    #[ignore] // Requires Redis to be running
    async fn test_lock_release_requires_token() {
        let store = fresh_store().await;
        let asset = AssetRef::phone(PhoneId(9));
        let ttl = Duration::from_secs(5);

        assert!(store.try_lock(asset, "first", ttl).await.unwrap());
        assert!(!store.try_lock(asset, "second", ttl).await.unwrap());
        store.unlock(asset, "second").await.unwrap();
        assert!(!store.try_lock(asset, "second", ttl).await.unwrap());
        store.unlock(asset, "first").await.unwrap();
        assert!(store.try_lock(asset, "second", ttl).await.unwrap());
    }
}
