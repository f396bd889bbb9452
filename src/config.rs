//! Configuration handling.
//!
//! Retry defaults and pool options used by the library, plus the CLI arguments and
//! environment variables of the `sqldao` binary.

use crate::models::{ColumnSpec, SqlType};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_RETRY_COUNT: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;
pub const DEFAULT_MAX_CONNECTIONS_MEMORY: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 4, or 1 for in-memory databases)
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
}

impl PoolOptions {
    /// Get max_connections with a default based on where the database lives.
    ///
    /// Every connection to `:memory:` opens its own empty database, so in-memory
    /// pools hold a single connection.
    pub fn max_connections_or_default(&self, in_memory: bool) -> u32 {
        self.max_connections.unwrap_or(if in_memory {
            DEFAULT_MAX_CONNECTIONS_MEMORY
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections.filter(|max| min > *max) {
                return Err(format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    min, max
                ));
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// A database URL with pool options split off its query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// URL handed to the driver, pool keys removed.
    pub connection_string: String,
    pub pool_options: PoolOptions,
}

impl DatabaseConfig {
    /// Pool option keys that we extract from URL query parameters.
    const POOL_OPTION_KEYS: &'static [&'static str] = &[
        "max_connections",
        "min_connections",
        "idle_timeout",
        "acquire_timeout",
    ];

    /// Parse `sqlite:path/to/db.sqlite?max_connections=2` style URLs.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut url = Url::parse(s).map_err(|e| format!("Invalid URL: {e}"))?;
        if !url.scheme().eq_ignore_ascii_case("sqlite") {
            return Err(format!(
                "Unsupported database scheme '{}'; expected sqlite:path/to/db.sqlite",
                url.scheme()
            ));
        }
        if url.path().is_empty() {
            return Err("SQLite requires a database file path or :memory:".to_string());
        }

        let mut opts = Self::extract_options(&mut url, Self::POOL_OPTION_KEYS);
        let pool_options = PoolOptions {
            max_connections: parse_opt(&mut opts, "max_connections")?,
            min_connections: parse_opt(&mut opts, "min_connections")?,
            idle_timeout_secs: parse_opt(&mut opts, "idle_timeout")?,
            acquire_timeout_secs: parse_opt(&mut opts, "acquire_timeout")?,
        };
        pool_options.validate()?;

        Ok(Self {
            connection_string: url.to_string(),
            pool_options,
        })
    }

    /// Pull our keys out of the query string, keeping the rest for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }
}

fn parse_opt<T: std::str::FromStr>(
    opts: &mut HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, String> {
    opts.remove(key)
        .map(|v| {
            v.parse()
                .map_err(|_| format!("Invalid value '{}' for {}", v, key))
        })
        .transpose()
}

/// Parse a `--column` argument: `name`, `name:type` or `column=field[:type]`.
pub fn parse_column(s: &str) -> Result<ColumnSpec, String> {
    let (mapping, sql_type) = match s.split_once(':') {
        Some((m, t)) => {
            let t: SqlType = serde_json::from_value(serde_json::Value::String(t.to_lowercase()))
                .map_err(|_| format!("Unknown column type '{}'", t))?;
            (m, Some(t))
        }
        None => (s, None),
    };
    let column = match mapping.split_once('=') {
        Some((c, f)) => ColumnSpec::new(c.trim()).to_field(f.trim()),
        None => ColumnSpec::new(mapping.trim()),
    };
    if column.column_name.is_empty() {
        return Err("Column name cannot be empty".to_string());
    }
    Ok(match sql_type {
        Some(t) => column.typed(t),
        None => column,
    })
}

/// Configuration for the `sqldao` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqldao",
    about = "Run a parameterized SQL statement through the sqldao engine",
    version,
    author
)]
pub struct Config {
    /// Database URL, e.g. sqlite:data.db?max_connections=2
    #[arg(short = 'd', long = "database", value_name = "URL", env = "SQLDAO_DATABASE")]
    pub database: String,

    /// Retries after a transient failure
    #[arg(long, default_value_t = DEFAULT_RETRY_COUNT, env = "SQLDAO_RETRIES")]
    pub retries: u32,

    /// Delay between retries in milliseconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_MS, env = "SQLDAO_RETRY_DELAY_MS")]
    pub retry_delay_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLDAO_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLDAO_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a SELECT and print each row as JSON
    Query {
        sql: String,
        /// Positional parameter as JSON; an array fills the `?..?` member list
        #[arg(short, long = "param", value_name = "JSON")]
        params: Vec<String>,
        /// Result column: name, name:type or column=field[:type]
        #[arg(short, long = "column", value_name = "COLUMN", required = true, value_parser = parse_column)]
        columns: Vec<ColumnSpec>,
        /// Print only the first row
        #[arg(long)]
        one: bool,
    },
    /// Run an INSERT, UPDATE or DELETE and print the affected row count
    Execute {
        sql: String,
        /// Positional parameter as JSON; an array fills the `?..?` member list
        #[arg(short, long = "param", value_name = "JSON")]
        params: Vec<String>,
    },
}

impl Config {
    pub fn database_config(&self) -> Result<DatabaseConfig, String> {
        DatabaseConfig::parse(&self.database)
    }
}
