//! Env-backed runtime configuration, mirroring `mqk-db`'s `connect_from_env`
//! idiom: a single struct assembled from `std::env::var`, with `.context(...)`
//! at each read so a missing var fails fast with a readable message.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub password: String,
    pub pool_min: u32,
    pub pool_max: u32,
}

impl PostgresConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.db_name
        )
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub pool_max: u32,
    /// Socket timeout used for non-blocking commands. Must stay above
    /// `worker_poll_timeout_s` or a `claim` call can be torn down by the
    /// socket before the BRPOPLPUSH's own server-side timeout fires.
    pub socket_timeout_s: u64,
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pw) => format!("redis://:{}@{}:{}/{}", pw, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub redis: RedisConfig,

    pub solver_path_fast: String,

    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub timeout_s_sat: u64,
    pub timeout_s_sudoku: u64,

    pub max_formula_length: usize,
    pub max_tokens: usize,

    pub worker_poll_timeout_s: u64,
    pub job_ttl_s: u64,
    pub max_attempts: u32,
}

impl Config {
    /// Loads `.env.local` if present (dev convenience, silent if absent —
    /// production injects env vars directly), then reads from the process
    /// environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self> {
        let postgres = PostgresConfig {
            host: require_var("DB_HOST")?,
            port: parse_var("DB_PORT")?,
            db_name: require_var("DB_NAME")?,
            user: require_var("DB_USER")?,
            password: require_var("DB_PASSWORD")?,
            pool_min: parse_var_or("DB_POOL_MIN", 1)?,
            pool_max: parse_var_or("DB_POOL_MAX", 10)?,
        };

        let redis = RedisConfig {
            host: require_var("REDIS_HOST")?,
            port: parse_var("REDIS_PORT")?,
            db: parse_var_or("REDIS_DB", 0)?,
            password: env::var("REDIS_PASSWORD").ok(),
            pool_max: parse_var_or("REDIS_POOL_MAX_CONN", 15)?,
            socket_timeout_s: parse_var_or("REDIS_SOCKET_TIMEOUT_S", 15)?,
        };

        let config = Config {
            postgres,
            redis,
            solver_path_fast: env::var("SOLVER_PATH_FAST")
                .unwrap_or_else(|_| "./bin/satsolver_opt".to_string()),
            default_timeout_ms: parse_var_or("DEFAULT_TIMEOUT_MS", 250_000)?,
            max_timeout_ms: parse_var_or("MAX_TIMEOUT_MS", 300_000)?,
            timeout_s_sat: parse_var_or("TIMEOUT_S_SAT", 10)?,
            timeout_s_sudoku: parse_var_or("TIMEOUT_S_SUDOKU", 250)?,
            max_formula_length: parse_var_or("MAX_FORMULA_LENGTH", 300_000)?,
            max_tokens: parse_var_or("MAX_TOKENS", 85_000)?,
            worker_poll_timeout_s: parse_var_or("WORKER_POLL_TIMEOUT_S", 5)?,
            job_ttl_s: parse_var_or("JOB_TTL_S", 3600)?,
            max_attempts: parse_var_or("MAX_RETRIES", 3)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Fails fast on the one cross-cutting invariant spec.md §5 calls out
    /// by name: the broker's socket timeout must exceed the worker's poll
    /// timeout, or a slow BRPOPLPUSH gets killed by the socket before the
    /// server-side blocking timeout would have returned None.
    fn validate(&self) -> Result<()> {
        if self.redis.socket_timeout_s <= self.worker_poll_timeout_s {
            bail!(
                "REDIS_SOCKET_TIMEOUT_S ({}) must be greater than WORKER_POLL_TIMEOUT_S ({})",
                self.redis.socket_timeout_s,
                self.worker_poll_timeout_s
            );
        }
        if self.max_timeout_ms < self.default_timeout_ms {
            bail!(
                "MAX_TIMEOUT_MS ({}) must be >= DEFAULT_TIMEOUT_MS ({})",
                self.max_timeout_ms,
                self.default_timeout_ms
            );
        }
        Ok(())
    }

    pub fn worker_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_poll_timeout_s)
    }
}

fn require_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("missing env var {name}"))
}

fn parse_var<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = require_var(name)?;
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}"))
}

fn parse_var_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(k: &str, v: &str) {
        env::set_var(k, v);
    }
    fn unset(k: &str) {
        env::remove_var(k);
    }

    fn base_env() {
        set("DB_HOST", "localhost");
        set("DB_PORT", "5432");
        set("DB_NAME", "sat");
        set("DB_USER", "sat");
        set("DB_PASSWORD", "secret");
        set("REDIS_HOST", "localhost");
        set("REDIS_PORT", "6379");
    }

    #[test]
    fn loads_with_defaults() {
        base_env();
        unset("DB_POOL_MIN");
        unset("REDIS_SOCKET_TIMEOUT_S");
        unset("WORKER_POLL_TIMEOUT_S");
        let cfg = Config::from_process_env().expect("config should load");
        assert_eq!(cfg.postgres.pool_min, 1);
        assert_eq!(cfg.redis.pool_max, 15);
        assert_eq!(cfg.max_formula_length, 300_000);
        assert_eq!(cfg.max_tokens, 85_000);
    }

    #[test]
    fn rejects_socket_timeout_not_exceeding_poll_timeout() {
        base_env();
        set("REDIS_SOCKET_TIMEOUT_S", "5");
        set("WORKER_POLL_TIMEOUT_S", "5");
        let err = Config::from_process_env().unwrap_err();
        assert!(err.to_string().contains("must be greater than"));
    }

    #[test]
    fn missing_required_var_errors() {
        base_env();
        unset("DB_HOST");
        let err = Config::from_process_env().unwrap_err();
        assert!(err.to_string().contains("DB_HOST"));
        set("DB_HOST", "localhost");
    }
}
