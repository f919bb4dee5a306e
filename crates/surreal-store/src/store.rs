//! SurrealDB-backed idempotency store.
//!
//! One record per composite key, addressed as `table:[actor_id, scope, key]`.
//! Every operation is a single statement, so atomicity comes from the
//! database and any number of processes may share the table.
//!
//! `claim` emulates set-on-insert with `UPSERT ... RETURN BEFORE`: each SET
//! clause keeps the stored value while the record is live and assigns the
//! fresh one otherwise. `expires_at` is assigned last because SET clauses see
//! the fields already written by earlier clauses. The pre-image then says
//! whether this call inserted (no pre-image, or an expired one).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::sql::Datetime;

use idem_core::{
    IdempotencyClaim, IdempotencyData, IdempotencyKey, IdempotencyStatus, IdempotencyStore,
    PurgeExpired, RequestFingerprint,
};

use crate::config::SurrealStoreConfig;
use crate::error::{SurrealResult, SurrealStoreError, from_surrealdb_error};

const CLAIM: &str = "
    UPSERT ONLY type::thing($table, [$actor_id, $scope, $key]) SET
        fingerprint = IF expires_at > $now THEN fingerprint ELSE $fingerprint END,
        status = IF expires_at > $now THEN status ELSE 'in_progress' END,
        data = IF expires_at > $now THEN data ELSE NONE END,
        created_at = IF expires_at > $now THEN created_at ELSE $now END,
        actor_id = $actor_id,
        scope = $scope,
        `key` = $key,
        expires_at = IF expires_at > $now THEN expires_at ELSE $expires_at END
    RETURN BEFORE;
";

const COMPLETE: &str = "
    UPDATE type::thing($table, [$actor_id, $scope, $key])
        SET status = 'completed', data = $data
        WHERE status = 'in_progress' AND fingerprint = $fingerprint AND expires_at > $now
        RETURN NONE;
";

const RELEASE: &str = "
    DELETE type::thing($table, [$actor_id, $scope, $key])
        WHERE status = 'in_progress' AND fingerprint = $fingerprint
        RETURN NONE;
";

/// A record as read back from the table.
#[derive(Debug, Clone, Deserialize)]
struct StoredRecord {
    fingerprint: String,
    status: IdempotencyStatus,
    #[serde(default)]
    data: Option<IdempotencyData>,
    expires_at: Datetime,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    count: usize,
}

/// Durable idempotency store.
#[derive(Debug, Clone)]
pub struct SurrealStore {
    db: Arc<Surreal<Any>>,
    config: SurrealStoreConfig,
    ttl: TimeDelta,
}

impl SurrealStore {
    /// Connect to the database with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, or the connection or
    /// authentication fails.
    pub async fn connect(config: SurrealStoreConfig) -> SurrealResult<Self> {
        config.validate()?;
        let ttl = TimeDelta::from_std(config.ttl)
            .map_err(|err| SurrealStoreError::invalid_config(format!("ttl out of range: {err}")))?;

        let db = Surreal::<Any>::init();

        db.connect(config.url.as_str())
            .await
            .map_err(|err| SurrealStoreError::connection_failed(err.to_string()))?;

        if let Some((username, password)) = config.credentials() {
            db.signin(Root { username, password })
                .await
                .map_err(|err| SurrealStoreError::connection_failed(err.to_string()))?;
        }

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(from_surrealdb_error)?;

        tracing::info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            table = %config.table,
            "Connected to idempotency store"
        );

        Ok(Self {
            db: Arc::new(db),
            config,
            ttl,
        })
    }

    /// Connect and make sure the table and its indexes exist.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or defining the schema fails.
    pub async fn open(config: SurrealStoreConfig) -> SurrealResult<Self> {
        let store = Self::connect(config).await?;
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Get a reference to the underlying database client.
    #[must_use]
    pub fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    #[must_use]
    pub const fn config(&self) -> &SurrealStoreConfig {
        &self.config
    }

    /// Define the table, the unique composite index and the expiry index.
    ///
    /// Safe to run repeatedly and from several processes.
    ///
    /// # Errors
    ///
    /// Returns an error if schema initialization fails.
    pub async fn initialize_schema(&self) -> SurrealResult<()> {
        let schema = schema_for(&self.config.table);

        self.db
            .query(schema)
            .await
            .map_err(|err| SurrealStoreError::schema_error(err.to_string()))?
            .check()
            .map_err(|err| SurrealStoreError::schema_error(err.to_string()))?;

        tracing::debug!(table = %self.config.table, "Idempotency schema ready");
        Ok(())
    }

    /// Check if the database is healthy.
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails.
    pub async fn health_check(&self) -> SurrealResult<()> {
        self.db
            .query("INFO FOR DB")
            .await
            .map_err(from_surrealdb_error)?
            .check()
            .map_err(from_surrealdb_error)?;
        Ok(())
    }

    /// Number of records in the table, expired ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn record_count(&self) -> SurrealResult<usize> {
        let row: Option<CountRow> = self
            .db
            .query(format!("SELECT count() FROM {} GROUP ALL", self.config.table))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(|err| SurrealStoreError::decode_failed(err.to_string()))?;
        Ok(row.map_or(0, |row| row.count))
    }

    /// Physically delete every expired record.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn purge_expired_records(&self) -> SurrealResult<usize> {
        let removed: Vec<StoredRecord> = self
            .db
            .query(format!(
                "DELETE {} WHERE expires_at <= $now RETURN BEFORE",
                self.config.table
            ))
            .bind(("now", Datetime::from(Utc::now())))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(|err| SurrealStoreError::decode_failed(err.to_string()))?;

        if !removed.is_empty() {
            tracing::debug!(removed = removed.len(), table = %self.config.table, "Purged expired records");
        }
        Ok(removed.len())
    }

    async fn try_claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> SurrealResult<IdempotencyClaim> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| SurrealStoreError::invalid_config("ttl overflows the clock"))?;
        let now = Datetime::from(now);

        let before: Option<StoredRecord> = self
            .db
            .query(CLAIM)
            .bind(("table", self.config.table.clone()))
            .bind(("actor_id", key.actor_id().to_string()))
            .bind(("scope", key.scope().to_string()))
            .bind(("key", key.key().to_string()))
            .bind(("fingerprint", fingerprint.as_str().to_string()))
            .bind(("now", now.clone()))
            .bind(("expires_at", Datetime::from(expires_at)))
            .await
            .map_err(from_surrealdb_error)?
            .take(0)
            .map_err(from_surrealdb_error)?;

        let claim = match before {
            Some(record) if record.expires_at > now => IdempotencyClaim::existing(
                record.status,
                RequestFingerprint::new(record.fingerprint),
                record.data,
            ),
            Some(_) => {
                tracing::trace!(key = %key, "Expired record taken over");
                IdempotencyClaim::owned(fingerprint.clone())
            }
            None => IdempotencyClaim::owned(fingerprint.clone()),
        };
        Ok(claim)
    }
}

/// Idempotent DDL for `table`. The name must already be validated.
fn schema_for(table: &str) -> String {
    format!(
        "DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
         DEFINE INDEX IF NOT EXISTS {table}_identity ON TABLE {table} FIELDS actor_id, scope, `key` UNIQUE;
         DEFINE INDEX IF NOT EXISTS {table}_expires_at ON TABLE {table} FIELDS expires_at;"
    )
}

/// Fixed exponential pause between conflicting claim attempts.
fn conflict_backoff(attempt: u32) -> Duration {
    Duration::from_millis(5_u64.saturating_mul(1_u64 << attempt.min(6)))
}

#[async_trait]
impl IdempotencyStore for SurrealStore {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> idem_core::Result<IdempotencyClaim> {
        let mut attempt = 0_u32;
        loop {
            match self.try_claim(key, fingerprint).await {
                Err(err) if err.is_write_conflict() && attempt < self.config.conflict_retries => {
                    attempt = attempt.saturating_add(1);
                    tracing::debug!(key = %key, attempt, "Claim hit a write conflict, re-running");
                    tokio::time::sleep(conflict_backoff(attempt)).await;
                }
                result => return result.map_err(|err| err.into_core("claim")),
            }
        }
    }

    async fn complete(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
        data: &IdempotencyData,
    ) -> idem_core::Result<()> {
        self.db
            .query(COMPLETE)
            .bind(("table", self.config.table.clone()))
            .bind(("actor_id", key.actor_id().to_string()))
            .bind(("scope", key.scope().to_string()))
            .bind(("key", key.key().to_string()))
            .bind(("fingerprint", fingerprint.as_str().to_string()))
            .bind(("data", data.clone()))
            .bind(("now", Datetime::from(Utc::now())))
            .await
            .map_err(|err| from_surrealdb_error(err).into_core("complete"))?
            .check()
            .map_err(|err| from_surrealdb_error(err).into_core("complete"))?;
        Ok(())
    }

    async fn release(
        &self,
        key: &IdempotencyKey,
        fingerprint: &RequestFingerprint,
    ) -> idem_core::Result<()> {
        self.db
            .query(RELEASE)
            .bind(("table", self.config.table.clone()))
            .bind(("actor_id", key.actor_id().to_string()))
            .bind(("scope", key.scope().to_string()))
            .bind(("key", key.key().to_string()))
            .bind(("fingerprint", fingerprint.as_str().to_string()))
            .await
            .map_err(|err| from_surrealdb_error(err).into_core("release"))?
            .check()
            .map_err(|err| from_surrealdb_error(err).into_core("release"))?;
        Ok(())
    }
}

#[async_trait]
impl PurgeExpired for SurrealStore {
    async fn purge_expired(&self) -> idem_core::Result<usize> {
        self.purge_expired_records()
            .await
            .map_err(|err| err.into_core("purge_expired"))
    }
}
