use std::sync::Mutex;
use std::time::Duration;

use duet_models::RedisConfig;
use tracing::{debug, info, warn};

use crate::backend::CacheBackend;
use crate::error::StoreError;

/// Redis-backed cache.
///
/// Holds one synchronous connection behind a mutex. A connection that fails
/// with an I/O error is dropped and re-opened on the next call.
pub struct RedisBackend {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    timeout: Duration,
}

impl RedisBackend {
    /// Connect and PING within the configured timeout.
    pub fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url())?;
        let backend = Self {
            client,
            conn: Mutex::new(None),
            timeout: config.connect_timeout(),
        };

        let mut conn = backend.open()?;
        let pong: String = redis::cmd("PING").query(&mut conn)?;
        debug!(reply = %pong, "Redis PING");
        *backend.lock()? = Some(conn);

        info!(host = %config.host, port = config.port, db = config.db, "Connected to Redis");
        Ok(backend)
    }

    fn open(&self) -> Result<redis::Connection, StoreError> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        Ok(conn)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<redis::Connection>>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Redis mutex poisoned: {e}")))
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock()?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Unavailable("Redis connection missing".into()));
        };

        match op(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                if e.is_io_error() || e.is_connection_dropped() {
                    warn!(error = %e, "Redis connection lost, will reconnect");
                    *guard = None;
                }
                Err(StoreError::Redis(e))
            }
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_external(&self) -> bool {
        true
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            redis::cmd("PSETEX")
                .arg(key)
                .arg(ttl_millis(ttl))
                .arg(value)
                .query::<()>(conn)
        })
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn push_capped(
        &self,
        key: &str,
        item: &str,
        capacity: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let keep_from = -i64::try_from(capacity).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            redis::pipe()
                .atomic()
                .cmd("RPUSH")
                .arg(key)
                .arg(item)
                .ignore()
                .cmd("LTRIM")
                .arg(key)
                .arg(keep_from)
                .arg(-1)
                .ignore()
                .cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_millis(ttl))
                .ignore()
                .query::<()>(conn)
        })
    }

    fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| redis::cmd("LRANGE").arg(key).arg(0).arg(-1).query(conn))
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let keys: Vec<String> = redis::cmd("KEYS").arg(format!("{prefix}*")).query(conn)?;
            if keys.is_empty() {
                return Ok(0);
            }
            redis::cmd("DEL").arg(&keys).query(conn)
        })
    }

    fn count_prefix(&self, prefix: &str) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let keys: Vec<String> = redis::cmd("KEYS").arg(format!("{prefix}*")).query(conn)?;
            Ok(keys.len() as u64)
        })
    }
}
