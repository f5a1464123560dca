// Read/write-split database facade. One write pool, zero-or-more read
// pools (falls back to the write pool when none are configured). Reads
// route to a replica only for SQL the classifier considers an
// "unambiguously safe read"; every other shape, and all Exec/Begin calls,
// use the write pool. Grounded on the teacher's db::postgres::PostgresPool
// (retry, health check, masking) generalized to multiple pools, since the
// facade's routing and scrubbing hooks need the raw SQL text that a typed
// query builder (the teacher's Diesel layer) does not expose.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::db::pool::build_pg_pool;

/// Owned bind value for the facade's simple `exec`/`query_row_exists`
/// helpers. Callers needing richer typed results (user/token stores) go
/// straight to `write_pool()`/`read_pool_for()` with `sqlx::query_as!`
/// instead of going through this enum.
#[derive(Debug, Clone)]
pub enum BindValue {
    Str(String),
    I64(i64),
    Bool(bool),
    TimestampTz(DateTime<Utc>),
    Uuid(uuid::Uuid),
}

impl BindValue {
    fn log_repr(&self) -> String {
        match self {
            BindValue::Str(s) => s.clone(),
            BindValue::I64(n) => n.to_string(),
            BindValue::Bool(b) => b.to_string(),
            BindValue::TimestampTz(t) => t.to_rfc3339(),
            BindValue::Uuid(u) => u.to_string(),
        }
    }
}

fn bind_all(mut query: Query<'_, Postgres, PgArguments>, values: Vec<BindValue>) -> Query<'_, Postgres, PgArguments> {
    for value in values {
        query = match value {
            BindValue::Str(s) => query.bind(s),
            BindValue::I64(n) => query.bind(n),
            BindValue::Bool(b) => query.bind(b),
            BindValue::TimestampTz(t) => query.bind(t),
            BindValue::Uuid(u) => query.bind(u),
        };
    }
    query
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("pool error: {0}")]
    Pool(String),
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),
    #[error("attempted to start a transaction while already inside one")]
    NestedTransaction,
}

/// Runs synchronously after every query completes. `args` are already
/// scrubbed by the time the hook sees them if the SQL text mentions a
/// configured sensitive keyword.
pub type QueryHook = Arc<dyn Fn(&str, &[String], Duration, Option<&str>) + Send + Sync>;

static WRITE_VERB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(insert|update|delete|for\s+update)\b").unwrap());

static LEADING_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*([a-z]+)\b").unwrap());

/// Conservative "is this safe to route to a replica" classifier. Anything
/// not unambiguously a plain SELECT defaults to the write pool, including
/// CTEs (`WITH ...`) and comment-prefixed queries where the leading token
/// can't be determined.
pub fn is_safe_read(sql: &str) -> bool {
    let Some(caps) = LEADING_TOKEN.captures(sql) else {
        return false;
    };
    let leading = caps.get(1).unwrap().as_str().to_ascii_lowercase();
    if leading != "select" {
        return false;
    }
    !WRITE_VERB.is_match(sql)
}

fn scrub_args(sql: &str, args: &[String], sensitive_keywords: &[String]) -> Vec<String> {
    let lower = sql.to_ascii_lowercase();
    let mentions_sensitive = sensitive_keywords
        .iter()
        .any(|kw| lower.contains(&kw.to_ascii_lowercase()));
    if mentions_sensitive {
        args.iter().map(|_| "*****".to_string()).collect()
    } else {
        args.to_vec()
    }
}

pub struct DatabaseFacade {
    write_pool: PgPool,
    read_pools: Vec<PgPool>,
    read_cursor: AtomicUsize,
    hook: std::sync::RwLock<Option<QueryHook>>,
    sensitive_keywords: Vec<String>,
}

impl DatabaseFacade {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, DbError> {
        let write_pool = build_pg_pool(cfg, &cfg.write_host, 3)
            .await
            .map_err(DbError::Query)?;

        let mut read_pools = Vec::new();
        for host in &cfg.read_hosts {
            match build_pg_pool(cfg, host, 3).await {
                Ok(pool) => read_pools.push(pool),
                Err(e) => warn!("failed to connect to read replica {}: {}", host, e),
            }
        }

        info!(
            "database facade ready: 1 write pool, {} read pool(s)",
            read_pools.len()
        );

        Ok(Self {
            write_pool,
            read_pools,
            read_cursor: AtomicUsize::new(0),
            hook: std::sync::RwLock::new(None),
            sensitive_keywords: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
            ],
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn from_pools(write_pool: PgPool, read_pools: Vec<PgPool>) -> Self {
        Self {
            write_pool,
            read_pools,
            read_cursor: AtomicUsize::new(0),
            hook: std::sync::RwLock::new(None),
            sensitive_keywords: vec![
                "password".to_string(),
                "token".to_string(),
                "secret".to_string(),
            ],
        }
    }

    pub fn register_hook(&self, hook: QueryHook) {
        *self.hook.write().unwrap() = Some(hook);
    }

    pub fn write_pool(&self) -> &PgPool {
        &self.write_pool
    }

    /// Round-robin pick among configured read pools, falling back to the
    /// write pool when there are none.
    fn pick_read_pool(&self) -> &PgPool {
        if self.read_pools.is_empty() {
            return &self.write_pool;
        }
        let idx = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_pools.len();
        &self.read_pools[idx]
    }

    fn pool_for_query(&self, sql: &str) -> &PgPool {
        if is_safe_read(sql) {
            self.pick_read_pool()
        } else {
            &self.write_pool
        }
    }

    fn run_hook(&self, sql: &str, args: &[String], duration: Duration, err: Option<&str>) {
        if let Some(hook) = self.hook.read().unwrap().as_ref() {
            let scrubbed = scrub_args(sql, args, &self.sensitive_keywords);
            hook(sql, &scrubbed, duration, err);
        }
    }

    /// Rewrite `$n` placeholders for dialects that need it. Postgres
    /// already uses `$n` natively, so this is a pass-through for the only
    /// backend this facade targets; kept as a named seam so a future
    /// non-Postgres backend does not require call-site changes.
    pub fn rebind(&self, sql: &str) -> String {
        sql.to_string()
    }

    /// Picks a read or write pool for `sql` without running it, for
    /// callers that need typed results via `sqlx::query_as!` rather than
    /// the stringly-typed helpers below (user/token stores).
    pub fn read_pool_for(&self, sql: &str) -> &PgPool {
        self.pool_for_query(sql)
    }

    /// Runs the registered query hook for a query executed outside the
    /// `exec`/`query_row_exists` helpers.
    pub fn record_query(&self, sql: &str, args: &[String], duration: Duration, err: Option<&str>) {
        self.run_hook(sql, args, duration, err);
    }

    pub async fn exec(&self, sql: &str, values: Vec<BindValue>) -> Result<u64, DbError> {
        let log_args: Vec<String> = values.iter().map(BindValue::log_repr).collect();
        let start = Instant::now();
        let result = bind_all(sqlx::query(sql), values)
            .execute(&self.write_pool)
            .await;
        let duration = start.elapsed();
        match result {
            Ok(done) => {
                self.run_hook(sql, &log_args, duration, None);
                Ok(done.rows_affected())
            }
            Err(e) => {
                self.run_hook(sql, &log_args, duration, Some(&e.to_string()));
                Err(DbError::Query(e))
            }
        }
    }

    pub async fn query_row_exists(&self, sql: &str, values: Vec<BindValue>) -> Result<bool, DbError> {
        let log_args: Vec<String> = values.iter().map(BindValue::log_repr).collect();
        let pool = self.pool_for_query(sql);
        let start = Instant::now();
        let result = bind_all(sqlx::query(sql), values)
            .fetch_optional(pool)
            .await;
        let duration = start.elapsed();
        match result {
            Ok(row) => {
                self.run_hook(sql, &log_args, duration, None);
                Ok(row.is_some())
            }
            Err(e) => {
                self.run_hook(sql, &log_args, duration, Some(&e.to_string()));
                Err(DbError::Query(e))
            }
        }
    }

    /// Acquires a write-pool transaction, invokes `f`, commits on success
    /// and rolls back on error (the `sqlx::Transaction` also rolls back
    /// automatically on drop if neither commit nor rollback is called,
    /// i.e. on panic unwinding through this frame). Nested calls reuse a
    /// fresh connection from the pool rather than the outer transaction,
    /// which is never what a caller wants, so re-entrant calls from within
    /// `f` are rejected. The guard is a task-local, not a thread-local:
    /// under the multi-threaded runtime a request's logical task can
    /// resume on a different worker thread after an `.await`, and a
    /// thread-local would either false-positive against an unrelated
    /// request sharing that thread or miss genuine reentrancy that moved
    /// threads.
    pub async fn with_tx<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: for<'c> FnOnce(
            &'c mut Transaction<'_, Postgres>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<T, DbError>> + Send + 'c>,
        >,
    {
        if IN_TRANSACTION.try_with(|_| ()).is_ok() {
            return Err(DbError::NestedTransaction);
        }
        IN_TRANSACTION.scope((), self.with_tx_inner(f)).await
    }

    async fn with_tx_inner<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: for<'c> FnOnce(
            &'c mut Transaction<'_, Postgres>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<T, DbError>> + Send + 'c>,
        >,
    {
        let mut tx = self.write_pool.begin().await.map_err(DbError::Query)?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(DbError::Query)?;
                Ok(value)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

tokio::task_local! {
    static IN_TRANSACTION: ();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_plain_select_as_safe() {
        assert!(is_safe_read("SELECT id FROM users WHERE id = $1"));
        assert!(is_safe_read("  select 1"));
    }

    #[test]
    fn classifies_cte_as_unsafe() {
        assert!(!is_safe_read("WITH t AS (SELECT 1) SELECT * FROM t"));
    }

    #[test]
    fn classifies_write_verbs_as_unsafe() {
        assert!(!is_safe_read("INSERT INTO users (email) VALUES ($1)"));
        assert!(!is_safe_read("UPDATE users SET email = $1"));
        assert!(!is_safe_read("DELETE FROM users WHERE id = $1"));
        assert!(!is_safe_read("SELECT * FROM users WHERE id = $1 FOR UPDATE"));
    }

    #[test]
    fn defaults_comment_prefixed_query_to_write() {
        assert!(!is_safe_read("-- trace: get user\nSELECT * FROM users"));
    }

    #[test]
    fn scrubs_args_for_sensitive_sql() {
        let scrubbed = scrub_args(
            "UPDATE users SET password_hash = $1 WHERE id = $2",
            &["hash123".to_string(), "u1".to_string()],
            &["password".to_string(), "token".to_string(), "secret".to_string()],
        );
        assert_eq!(scrubbed, vec!["*****".to_string(), "*****".to_string()]);
    }

    #[test]
    fn leaves_args_alone_for_non_sensitive_sql() {
        let scrubbed = scrub_args(
            "SELECT * FROM users WHERE id = $1",
            &["u1".to_string()],
            &["password".to_string(), "token".to_string(), "secret".to_string()],
        );
        assert_eq!(scrubbed, vec!["u1".to_string()]);
    }
}
