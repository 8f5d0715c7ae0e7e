use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::errors::store_error::StoreError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Machine and node ids each occupy five bits of a snowflake id.
pub const SNOWFLAKE_ID_RANGE: RangeInclusive<i32> = 0..=31;

#[derive(Clone, Debug)]
pub struct Config {
        pub database_url: Option<String>,
        pub pool_size: u32,
        pub keyspace: String,
        pub replication_factor: u32,
        pub page_size: i64,
        pub machine_id: i32,
        pub node_id: i32,
}

impl Default for Config {
        fn default() -> Self {
                Self {
                        database_url: None,
                        pool_size: 10,
                        keyspace: "messenger".to_string(),
                        replication_factor: 1,
                        page_size: DEFAULT_PAGE_SIZE,
                        machine_id: 1,
                        node_id: 1,
                }
        }
}

impl Config {
        pub fn from_env() -> Result<Self, StoreError> {
                Self::from_lookup(|name| env::var(name).ok())
        }

        /// Builds the config from any variable source. Unset variables fall back to their defaults; set but
        /// invalid ones are errors.
        pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
        where
                F: Fn(&str) -> Option<String>,
        {
                let defaults = Self::default();

                Ok(Self {
                        database_url: lookup("DATABASE_URL"),
                        pool_size: in_range(&lookup, "DATABASE_POOL_SIZE", 1..=u32::MAX)?.unwrap_or(defaults.pool_size),
                        keyspace: lookup("MESSENGER_KEYSPACE").unwrap_or(defaults.keyspace),
                        replication_factor: in_range(&lookup, "MESSENGER_REPLICATION_FACTOR", 1..=u32::MAX)?
                                .unwrap_or(defaults.replication_factor),
                        page_size: in_range(&lookup, "MESSENGER_PAGE_SIZE", 1..=MAX_PAGE_SIZE)?
                                .unwrap_or(defaults.page_size),
                        machine_id: in_range(&lookup, "SNOWFLAKE_MACHINE_ID", SNOWFLAKE_ID_RANGE)?
                                .unwrap_or(defaults.machine_id),
                        node_id: in_range(&lookup, "SNOWFLAKE_NODE_ID", SNOWFLAKE_ID_RANGE)?.unwrap_or(defaults.node_id),
                })
        }

        pub fn database_url(&self) -> Result<&str, StoreError> {
                self.database_url
                        .as_deref()
                        .ok_or_else(|| StoreError::Config("DATABASE_URL must be set".to_string()))
        }
}

fn in_range<F, T>(lookup: &F, name: &str, range: RangeInclusive<T>) -> Result<Option<T>, StoreError>
where
        F: Fn(&str) -> Option<String>,
        T: FromStr + PartialOrd + std::fmt::Display,
{
        let Some(raw) = lookup(name) else {
                return Ok(None);
        };

        let value = raw
                .trim()
                .parse::<T>()
                .map_err(|_| StoreError::Config(format!("{name} must be a number, got {raw:?}")))?;
        if !range.contains(&value) {
                return Err(StoreError::Config(format!(
                        "{name} must be between {} and {}, got {value}",
                        range.start(),
                        range.end()
                )));
        }

        Ok(Some(value))
}
