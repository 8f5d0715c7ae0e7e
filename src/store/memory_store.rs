use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDateTime;
use tracing::{debug, error, info};

use crate::cql;
use crate::errors::store_error::StoreError;
use crate::models::{Conversation, ConversationSummary, LastMessageCacheEntry, Message, MessageQuery};
use crate::store::{ConversationIndex, LastMessageCache, MessageLog, MessengerStore};

/// Sorts a partition the way the `messages` table clusters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ClusteringKey {
        timestamp: Reverse<NaiveDateTime>,
        message_id: i64,
}

impl From<&Message> for ClusteringKey {
        fn from(message: &Message) -> Self {
                ClusteringKey {
                        timestamp: Reverse(message.timestamp),
                        message_id: message.message_id,
                }
        }
}

#[derive(Debug, Default)]
struct Tables {
        created: BTreeSet<&'static str>,
        conversations: BTreeMap<i64, Conversation>,
        messages: HashMap<i64, BTreeMap<ClusteringKey, Message>>,
        last_message_cache: HashMap<i64, LastMessageCacheEntry>,
}

impl Tables {
        fn require(&self, table: &str) -> Result<(), StoreError> {
                if self.created.contains(table) {
                        Ok(())
                } else {
                        Err(StoreError::Internal(format!("table {table} does not exist")))
                }
        }

        fn summary(&self, conversation: &Conversation) -> Option<ConversationSummary> {
                self.last_message_cache
                        .get(&conversation.conversation_id)
                        .map(|entry| ConversationSummary::from((conversation.clone(), entry.clone())))
        }

        fn summaries_for_user(&self, user_id: i64) -> Vec<ConversationSummary> {
                let mut summaries = self
                        .conversations
                        .values()
                        .filter(|conversation| conversation.has_participant(user_id))
                        .filter_map(|conversation| self.summary(conversation))
                        .collect::<Vec<ConversationSummary>>();
                summaries.sort_by(|a, b| {
                        b.last_message_at
                                .cmp(&a.last_message_at)
                                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
                });
                summaries
        }
}

/// In-process store. A single lock guards all three tables, so multi-table writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
        tables: RwLock<Tables>,
}

impl MemoryStore {
        pub fn new() -> Self {
                Self::default()
        }

        /// A store whose schema is already in place.
        pub fn with_schema() -> Result<Self, StoreError> {
                let store = Self::new();
                store.ensure_schema()?;
                Ok(store)
        }

        pub fn created_tables(&self) -> Result<Vec<&'static str>, StoreError> {
                Ok(self.read()?.created.iter().copied().collect())
        }

        fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
                self.tables.read().map_err(|_| {
                        error!("memory store lock poisoned");
                        StoreError::Internal("memory store lock poisoned".to_string())
                })
        }

        fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
                self.tables.write().map_err(|_| {
                        error!("memory store lock poisoned");
                        StoreError::Internal("memory store lock poisoned".to_string())
                })
        }
}

impl ConversationIndex for MemoryStore {
        fn find_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>, StoreError> {
                let tables = self.read()?;
                tables.require(cql::CONVERSATIONS)?;

                Ok(tables.conversations.get(&conversation_id).cloned())
        }

        fn find_conversation_between(
                &self,
                user1_id: i64,
                user2_id: i64,
        ) -> Result<Option<Conversation>, StoreError> {
                let tables = self.read()?;
                tables.require(cql::CONVERSATIONS)?;

                Ok(tables
                        .conversations
                        .values()
                        .find(|conversation| conversation.is_between(user1_id, user2_id))
                        .cloned())
        }
}

impl MessageLog for MemoryStore {
        fn find_messages(&self, conversation_id: i64, query: MessageQuery) -> Result<Vec<Message>, StoreError> {
                let tables = self.read()?;
                tables.require(cql::MESSAGES)?;

                Ok(tables
                        .messages
                        .get(&conversation_id)
                        .map(|partition| {
                                partition
                                        .values()
                                        .filter(|message| query.matches(message))
                                        .skip(query.offset.max(0) as usize)
                                        .take(query.limit.max(0) as usize)
                                        .cloned()
                                        .collect()
                        })
                        .unwrap_or_default())
        }

        fn count_messages(&self, conversation_id: i64, before: Option<NaiveDateTime>) -> Result<i64, StoreError> {
                let tables = self.read()?;
                tables.require(cql::MESSAGES)?;

                let query = MessageQuery {
                        before,
                        offset: 0,
                        limit: i64::MAX,
                };
                Ok(tables
                        .messages
                        .get(&conversation_id)
                        .map_or(0, |partition| partition.values().filter(|message| query.matches(message)).count())
                        as i64)
        }
}

impl LastMessageCache for MemoryStore {
        fn find_entry(&self, conversation_id: i64) -> Result<Option<LastMessageCacheEntry>, StoreError> {
                let tables = self.read()?;
                tables.require(cql::LAST_MESSAGE_CACHE)?;

                Ok(tables.last_message_cache.get(&conversation_id).cloned())
        }

        fn find_conversations_for_user(
                &self,
                user_id: i64,
                offset: i64,
                limit: i64,
        ) -> Result<Vec<ConversationSummary>, StoreError> {
                let tables = self.read()?;
                tables.require(cql::LAST_MESSAGE_CACHE)?;

                Ok(tables
                        .summaries_for_user(user_id)
                        .into_iter()
                        .skip(offset.max(0) as usize)
                        .take(limit.max(0) as usize)
                        .collect())
        }

        fn count_conversations_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
                let tables = self.read()?;
                tables.require(cql::LAST_MESSAGE_CACHE)?;

                Ok(tables.summaries_for_user(user_id).len() as i64)
        }
}

impl MessengerStore for MemoryStore {
        fn ensure_schema(&self) -> Result<(), StoreError> {
                let mut tables = self.write()?;
                for table in cql::tables() {
                        if tables.created.insert(table.name) {
                                info!(table = table.name, "created table");
                        }
                }

                Ok(())
        }

        fn open_conversation(&self, conversation: &Conversation) -> Result<(Conversation, bool), StoreError> {
                let mut tables = self.write()?;
                tables.require(cql::CONVERSATIONS)?;
                tables.require(cql::LAST_MESSAGE_CACHE)?;

                if let Some(existing) = tables
                        .conversations
                        .values()
                        .find(|existing| existing.is_between(conversation.user1_id, conversation.user2_id))
                {
                        debug!(conversation_id = existing.conversation_id, "conversation already open");
                        return Ok((existing.clone(), false));
                }

                if tables.conversations.contains_key(&conversation.conversation_id) {
                        return Err(StoreError::Conflict(format!(
                                "conversation {} already exists",
                                conversation.conversation_id
                        )));
                }

                tables.conversations.insert(conversation.conversation_id, conversation.clone());
                tables.last_message_cache
                        .insert(conversation.conversation_id, LastMessageCacheEntry::empty(conversation));

                info!(conversation_id = conversation.conversation_id, "opened conversation");
                Ok((conversation.clone(), true))
        }

        fn append_message(&self, message: &Message) -> Result<LastMessageCacheEntry, StoreError> {
                let mut tables = self.write()?;
                tables.require(cql::MESSAGES)?;
                tables.require(cql::LAST_MESSAGE_CACHE)?;
                tables.require(cql::CONVERSATIONS)?;

                if !tables.conversations.contains_key(&message.conversation_id) {
                        return Err(StoreError::NotFound(format!(
                                "conversation {} not found",
                                message.conversation_id
                        )));
                }

                let key = ClusteringKey::from(message);
                let partition = tables.messages.entry(message.conversation_id).or_default();
                if partition.contains_key(&key) {
                        return Err(StoreError::Conflict(format!(
                                "message {} already exists in conversation {}",
                                message.message_id, message.conversation_id
                        )));
                }
                partition.insert(key, message.clone());

                let entry = partition
                        .values()
                        .next()
                        .map(LastMessageCacheEntry::from)
                        .ok_or_else(|| StoreError::Internal("message log is empty after append".to_string()))?;
                tables.last_message_cache.insert(message.conversation_id, entry.clone());

                if let Some(conversation) = tables.conversations.get_mut(&message.conversation_id) {
                        conversation.last_timestamp = conversation.last_timestamp.max(entry.last_timestamp);
                }

                info!(
                        conversation_id = message.conversation_id,
                        message_id = message.message_id,
                        "appended message"
                );
                Ok(entry)
        }
}
