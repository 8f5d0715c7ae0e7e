//! The wide-column contract of the `messenger` keyspace.
//!
//! Statements are rendered exactly as they are applied to a Cassandra cluster. Every statement is
//! guarded by `IF NOT EXISTS`, so replaying the full script is a no-op.

use std::fmt::{Display, Formatter};

use crate::config::Config;

pub const LAST_MESSAGE_CACHE: &str = "last_message_cache";
pub const MESSAGES: &str = "messages";
pub const CONVERSATIONS: &str = "conversations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqlType {
        BigInt,
        Text,
        Timestamp,
}

impl Display for CqlType {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match self {
                        CqlType::BigInt => write!(f, "bigint"),
                        CqlType::Text => write!(f, "text"),
                        CqlType::Timestamp => write!(f, "timestamp"),
                }
        }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
        Asc,
        Desc,
}

impl Display for Order {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                match self {
                        Order::Asc => write!(f, "ASC"),
                        Order::Desc => write!(f, "DESC"),
                }
        }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
        pub name: String,
        pub replication_factor: u32,
}

impl Keyspace {
        pub fn new(name: impl Into<String>, replication_factor: u32) -> Self {
                Keyspace {
                        name: name.into(),
                        replication_factor,
                }
        }

        pub fn from_config(config: &Config) -> Self {
                Keyspace::new(config.keyspace.clone(), config.replication_factor)
        }

        pub fn create_statement(&self) -> String {
                format!(
                        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}};",
                        self.name, self.replication_factor
                )
        }
}

impl Default for Keyspace {
        fn default() -> Self {
                Keyspace::new("messenger", 1)
        }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
        pub name: &'static str,
        pub columns: Vec<(&'static str, CqlType)>,
        pub partition_key: Vec<&'static str>,
        pub clustering: Vec<(&'static str, Order)>,
}

impl TableDefinition {
        pub fn primary_key(&self) -> Vec<&'static str> {
                self.partition_key
                        .iter()
                        .copied()
                        .chain(self.clustering.iter().map(|(column, _)| *column))
                        .collect()
        }

        pub fn create_statement(&self, keyspace: &Keyspace) -> String {
                let columns = self
                        .columns
                        .iter()
                        .map(|(name, kind)| format!("    {name} {kind},"))
                        .collect::<Vec<String>>()
                        .join("\n");

                let partition = match self.partition_key.as_slice() {
                        [single] => single.to_string(),
                        columns => format!("({})", columns.join(", ")),
                };
                let primary_key = if self.clustering.is_empty() {
                        partition
                } else {
                        let clustering = self
                                .clustering
                                .iter()
                                .map(|(column, _)| *column)
                                .collect::<Vec<&str>>()
                                .join(", ");
                        format!("{partition}, {clustering}")
                };

                let mut statement = format!(
                        "CREATE TABLE IF NOT EXISTS {}.{} (\n{}\n    PRIMARY KEY ({})\n)",
                        keyspace.name, self.name, columns, primary_key
                );
                if self.clustering.iter().any(|(_, order)| *order == Order::Desc) {
                        let order = self
                                .clustering
                                .iter()
                                .map(|(column, order)| format!("{column} {order}"))
                                .collect::<Vec<String>>()
                                .join(", ");
                        statement.push_str(&format!(" WITH CLUSTERING ORDER BY ({order})"));
                }
                statement.push(';');
                statement
        }
}

pub fn last_message_cache() -> TableDefinition {
        TableDefinition {
                name: LAST_MESSAGE_CACHE,
                columns: vec![
                        ("conversation_id", CqlType::BigInt),
                        ("sender_id", CqlType::BigInt),
                        ("receiver_id", CqlType::BigInt),
                        ("last_timestamp", CqlType::Timestamp),
                        ("last_message", CqlType::Text),
                ],
                partition_key: vec!["conversation_id"],
                clustering: vec![],
        }
}

pub fn messages() -> TableDefinition {
        TableDefinition {
                name: MESSAGES,
                columns: vec![
                        ("conversation_id", CqlType::BigInt),
                        ("timestamp", CqlType::Timestamp),
                        ("message_id", CqlType::BigInt),
                        ("content", CqlType::Text),
                        ("sender_id", CqlType::BigInt),
                        ("receiver_id", CqlType::BigInt),
                ],
                partition_key: vec!["conversation_id"],
                clustering: vec![("timestamp", Order::Desc), ("message_id", Order::Asc)],
        }
}

// The declared key folds both participants into the clustering columns, so conversation_id alone is
// not unique at the storage level. Ids are generated unique instead.
pub fn conversations() -> TableDefinition {
        TableDefinition {
                name: CONVERSATIONS,
                columns: vec![
                        ("conversation_id", CqlType::BigInt),
                        ("user1_id", CqlType::BigInt),
                        ("user2_id", CqlType::BigInt),
                        ("last_timestamp", CqlType::Timestamp),
                ],
                partition_key: vec!["conversation_id"],
                clustering: vec![("user1_id", Order::Asc), ("user2_id", Order::Asc)],
        }
}

pub fn tables() -> Vec<TableDefinition> {
        vec![last_message_cache(), messages(), conversations()]
}

/// Keyspace statement followed by one statement per table.
pub fn schema_statements(keyspace: &Keyspace) -> Vec<String> {
        std::iter::once(keyspace.create_statement())
                .chain(tables().iter().map(|table| table.create_statement(keyspace)))
                .collect()
}
