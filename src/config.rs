//! Process configuration loaded from the environment
//!
//! `.env` is honored through dotenvy. Store credentials are only required
//! when the persistent backends are in use.

use crate::lifecycle::LifecycleConfig;
use crate::metadata::PostgresConfig;
use crate::{Error, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub key_prefix: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Base of the retrieval URLs handed back in `Location` headers.
    pub public_base_url: String,
    pub max_upload_bytes: usize,
    pub sweep_interval: Duration,
    /// Serve from in-memory stores instead of PostgreSQL and S3.
    pub in_memory: bool,
    pub database_url: Option<String>,
    pub database_pool_size: u32,
    pub blob: BlobConfig,
    pub lifecycle: LifecycleConfig,
}

/// Longest retention accepted from the environment.
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const MAX_ORPHAN_GRACE_SECS: i64 = 30 * 86_400;

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", name, raw))),
        None => Ok(default),
    }
}

fn flag(name: &str, default: bool) -> Result<bool> {
    match var(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(Error::Config(format!(
            "{} must be a boolean, got {:?}",
            name, other
        ))),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let in_memory = flag("IN_MEMORY", false)?;
        let retention_days: i64 = parsed("RETENTION_DAYS", 10)?;
        if !(1..=MAX_RETENTION_DAYS).contains(&retention_days) {
            return Err(Error::Config(format!(
                "RETENTION_DAYS must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        let retention = chrono::Duration::try_days(retention_days)
            .ok_or_else(|| Error::Config("RETENTION_DAYS out of range".to_string()))?;

        let grace_secs: i64 = parsed("ORPHAN_GRACE_SECS", 3_600)?;
        if !(0..=MAX_ORPHAN_GRACE_SECS).contains(&grace_secs) {
            return Err(Error::Config(format!(
                "ORPHAN_GRACE_SECS must be between 0 and {}",
                MAX_ORPHAN_GRACE_SECS
            )));
        }
        let orphan_grace = chrono::Duration::try_seconds(grace_secs)
            .ok_or_else(|| Error::Config("ORPHAN_GRACE_SECS out of range".to_string()))?;

        let config = Self {
            bind_addr: parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            public_base_url: var("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 10 << 20)?,
            sweep_interval: Duration::from_secs(parsed("SWEEP_INTERVAL_SECS", 86_400)?),
            in_memory,
            database_url: var("DATABASE_URL"),
            database_pool_size: parsed("DATABASE_POOL_SIZE", 5)?,
            blob: BlobConfig {
                endpoint: var("BLOB_ENDPOINT")
                    .unwrap_or_else(|| "http://localhost:9000".to_string()),
                region: var("BLOB_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                bucket: var("BLOB_BUCKET").unwrap_or_else(|| "images".to_string()),
                key_prefix: var("BLOB_KEY_PREFIX").unwrap_or_else(|| "images/".to_string()),
                access_key_id: var("BLOB_ACCESS_KEY_ID"),
                secret_access_key: var("BLOB_SECRET_ACCESS_KEY"),
            },
            lifecycle: LifecycleConfig {
                retention,
                store_timeout: Duration::from_secs(parsed("STORE_TIMEOUT_SECS", 10)?),
                reclaim_orphans: flag("SWEEP_RECLAIM_ORPHANS", true)?,
                orphan_grace,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("SWEEP_INTERVAL_SECS must be positive".to_string()));
        }
        if self.lifecycle.store_timeout.is_zero() {
            return Err(Error::Config("STORE_TIMEOUT_SECS must be positive".to_string()));
        }
        if self.lifecycle.orphan_grace < chrono::Duration::zero() {
            return Err(Error::Config("ORPHAN_GRACE_SECS must not be negative".to_string()));
        }
        if self.in_memory {
            return Ok(());
        }
        if self.database_url.is_none() {
            return Err(Error::Config("DATABASE_URL not set".to_string()));
        }
        if self.blob.access_key_id.is_none() {
            return Err(Error::Config("BLOB_ACCESS_KEY_ID not set".to_string()));
        }
        if self.blob.secret_access_key.is_none() {
            return Err(Error::Config("BLOB_SECRET_ACCESS_KEY not set".to_string()));
        }
        Ok(())
    }

    pub fn postgres(&self) -> Result<PostgresConfig> {
        let url = self
            .database_url
            .clone()
            .ok_or_else(|| Error::Config("DATABASE_URL not set".to_string()))?;
        Ok(PostgresConfig {
            url,
            pool_size: self.database_pool_size,
            acquire_timeout: self.lifecycle.store_timeout,
            ..PostgresConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "IN_MEMORY",
        "RETENTION_DAYS",
        "BIND_ADDR",
        "PUBLIC_BASE_URL",
        "MAX_UPLOAD_BYTES",
        "SWEEP_INTERVAL_SECS",
        "DATABASE_URL",
        "DATABASE_POOL_SIZE",
        "BLOB_ENDPOINT",
        "BLOB_REGION",
        "BLOB_BUCKET",
        "BLOB_KEY_PREFIX",
        "BLOB_ACCESS_KEY_ID",
        "BLOB_SECRET_ACCESS_KEY",
        "STORE_TIMEOUT_SECS",
        "SWEEP_RECLAIM_ORPHANS",
        "ORPHAN_GRACE_SECS",
    ];

    fn with_env<T>(pairs: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for name in VARS {
            std::env::remove_var(name);
        }
        for (name, value) in pairs {
            std::env::set_var(name, value);
        }
        let result = f();
        for name in VARS {
            std::env::remove_var(name);
        }
        result
    }

    #[test]
    fn test_in_memory_defaults() {
        let config = with_env(&[("IN_MEMORY", "true")], Config::from_env).unwrap();

        assert!(config.in_memory);
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.sweep_interval, Duration::from_secs(86_400));
        assert_eq!(config.lifecycle.retention, chrono::Duration::days(10));
        assert!(config.lifecycle.reclaim_orphans);
        assert_eq!(config.blob.key_prefix, "images/");
        assert_eq!(config.public_base_url, "http://localhost:8080");
    }

    #[test]
    fn test_persistent_backends_need_credentials() {
        let err = with_env(&[], Config::from_env).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let err = with_env(&[("DATABASE_URL", "postgres://db/images")], Config::from_env)
            .unwrap_err();
        assert!(err.to_string().contains("BLOB_ACCESS_KEY_ID"));

        let config = with_env(
            &[
                ("DATABASE_URL", "postgres://db/images"),
                ("BLOB_ACCESS_KEY_ID", "key"),
                ("BLOB_SECRET_ACCESS_KEY", "secret"),
            ],
            Config::from_env,
        )
        .unwrap();
        assert_eq!(config.postgres().unwrap().url, "postgres://db/images");
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = with_env(
            &[
                ("IN_MEMORY", "1"),
                ("PUBLIC_BASE_URL", "https://img.example.com/"),
                ("RETENTION_DAYS", "3"),
                ("SWEEP_RECLAIM_ORPHANS", "off"),
                ("BIND_ADDR", "127.0.0.1:9999"),
            ],
            Config::from_env,
        )
        .unwrap();

        assert_eq!(config.public_base_url, "https://img.example.com");
        assert_eq!(config.lifecycle.retention, chrono::Duration::days(3));
        assert!(!config.lifecycle.reclaim_orphans);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9999");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = with_env(
            &[("IN_MEMORY", "true"), ("RETENTION_DAYS", "ten")],
            Config::from_env,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = with_env(
            &[("IN_MEMORY", "true"), ("RETENTION_DAYS", "0")],
            Config::from_env,
        )
        .unwrap_err();
        assert!(err.to_string().contains("RETENTION_DAYS"));

        let err = with_env(&[("IN_MEMORY", "maybe")], Config::from_env).unwrap_err();
        assert!(err.to_string().contains("IN_MEMORY"));
    }

    #[test]
    fn test_negative_orphan_grace_rejected() {
        let err = with_env(
            &[("IN_MEMORY", "true"), ("ORPHAN_GRACE_SECS", "-3600")],
            Config::from_env,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("ORPHAN_GRACE_SECS")));

        let config = with_env(
            &[("IN_MEMORY", "true"), ("ORPHAN_GRACE_SECS", "0")],
            Config::from_env,
        )
        .unwrap();
        assert_eq!(config.lifecycle.orphan_grace, chrono::Duration::zero());
    }

    #[test]
    fn test_huge_durations_rejected_without_panic() {
        for retention in ["200000000000", "1000000000", "36501"] {
            let err = with_env(
                &[("IN_MEMORY", "true"), ("RETENTION_DAYS", retention)],
                Config::from_env,
            )
            .unwrap_err();
            assert!(matches!(err, Error::Config(msg) if msg.contains("RETENTION_DAYS")));
        }

        let err = with_env(
            &[("IN_MEMORY", "true"), ("ORPHAN_GRACE_SECS", "9223372036854775807")],
            Config::from_env,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("ORPHAN_GRACE_SECS")));

        let config = with_env(
            &[("IN_MEMORY", "true"), ("RETENTION_DAYS", "36500")],
            Config::from_env,
        )
        .unwrap();
        assert_eq!(config.lifecycle.retention, chrono::Duration::days(MAX_RETENTION_DAYS));
    }

    #[test]
    fn test_validate_rejects_negative_grace() {
        let mut config = with_env(&[("IN_MEMORY", "true")], Config::from_env).unwrap();
        config.lifecycle.orphan_grace = chrono::Duration::seconds(-1);

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
