use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::errors::store_error::StoreError;
use crate::models::{Conversation, ConversationSummary, LastMessageCacheEntry, Message, MessageQuery};
use crate::repositories::conversation_repository::ConversationRepository;
use crate::repositories::last_message_cache_repository::LastMessageCacheRepository;
use crate::repositories::message_repository::MessageRepository;
use crate::store::{ConversationIndex, LastMessageCache, MessageLog, MessengerStore};
use crate::DbPool;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Racing first contacts abort all but one serializable transaction; the losers rerun and find the winner.
const OPEN_CONVERSATION_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct PgStore {
        pool: DbPool,

        conversation_repository: ConversationRepository,
        last_message_cache_repository: LastMessageCacheRepository,
        message_repository: MessageRepository,
}

impl PgStore {
        pub fn new(pool: DbPool) -> Self {
                Self {
                        conversation_repository: ConversationRepository::new(pool.clone()),
                        last_message_cache_repository: LastMessageCacheRepository::new(pool.clone()),
                        message_repository: MessageRepository::new(pool.clone()),
                        pool,
                }
        }

        pub fn connect(config: &Config) -> Result<Self, StoreError> {
                let manager = ConnectionManager::<PgConnection>::new(config.database_url()?);
                let pool = r2d2::Pool::builder().max_size(config.pool_size).build(manager)?;
                info!(pool_size = config.pool_size, "connected to database");

                Ok(Self::new(pool))
        }

        pub fn pool(&self) -> &DbPool {
                &self.pool
        }

        fn try_open_conversation(
                connection: &mut PgConnection,
                conversation: &Conversation,
        ) -> Result<(Conversation, bool), StoreError> {
                connection.build_transaction().serializable().run::<_, StoreError, _>(|connection| {
                        if let Some(existing) = ConversationRepository::find_by_participants_in(
                                connection,
                                conversation.user1_id,
                                conversation.user2_id,
                        )? {
                                return Ok((existing, false));
                        }

                        ConversationRepository::insert_in(connection, conversation)?;
                        LastMessageCacheRepository::upsert_in(connection, &LastMessageCacheEntry::empty(conversation))?;

                        Ok((conversation.clone(), true))
                })
        }
}

impl ConversationIndex for PgStore {
        fn find_conversation(&self, conversation_id: i64) -> Result<Option<Conversation>, StoreError> {
                debug!(conversation_id, "finding conversation");
                self.conversation_repository.find_by_id(conversation_id)
        }

        fn find_conversation_between(
                &self,
                user1_id: i64,
                user2_id: i64,
        ) -> Result<Option<Conversation>, StoreError> {
                self.conversation_repository.find_by_participants(user1_id, user2_id)
        }
}

impl MessageLog for PgStore {
        fn find_messages(&self, conversation_id: i64, query: MessageQuery) -> Result<Vec<Message>, StoreError> {
                debug!(conversation_id, ?query, "finding messages");
                self.message_repository.find_by_conversation_id(conversation_id, query)
        }

        fn count_messages(&self, conversation_id: i64, before: Option<NaiveDateTime>) -> Result<i64, StoreError> {
                self.message_repository.count_by_conversation_id(conversation_id, before)
        }
}

impl LastMessageCache for PgStore {
        fn find_entry(&self, conversation_id: i64) -> Result<Option<LastMessageCacheEntry>, StoreError> {
                self.last_message_cache_repository.find_by_conversation_id(conversation_id)
        }

        fn find_conversations_for_user(
                &self,
                user_id: i64,
                offset: i64,
                limit: i64,
        ) -> Result<Vec<ConversationSummary>, StoreError> {
                debug!(user_id, offset, limit, "finding conversations for user");
                self.last_message_cache_repository.find_by_user_id(user_id, offset, limit)
        }

        fn count_conversations_for_user(&self, user_id: i64) -> Result<i64, StoreError> {
                self.last_message_cache_repository.count_by_user_id(user_id)
        }
}

impl MessengerStore for PgStore {
        fn ensure_schema(&self) -> Result<(), StoreError> {
                let mut connection = self.pool.get()?;

                let applied = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
                        error!("failed to run migrations: {e}");
                        StoreError::Migration(e.to_string())
                })?;
                info!(applied = applied.len(), "schema is up to date");

                Ok(())
        }

        fn open_conversation(&self, conversation: &Conversation) -> Result<(Conversation, bool), StoreError> {
                let mut connection = self.pool.get()?;

                let mut attempt = 1;
                let opened = loop {
                        match Self::try_open_conversation(&mut connection, conversation) {
                                Err(e) if e.is_serialization_failure() && attempt < OPEN_CONVERSATION_ATTEMPTS => {
                                        debug!(
                                                user1_id = conversation.user1_id,
                                                user2_id = conversation.user2_id,
                                                attempt,
                                                "retrying conversation open after serialization failure"
                                        );
                                        attempt += 1;
                                }
                                result => break result?,
                        }
                };

                if opened.1 {
                        info!(conversation_id = opened.0.conversation_id, "opened conversation");
                }
                Ok(opened)
        }

        fn append_message(&self, message: &Message) -> Result<LastMessageCacheEntry, StoreError> {
                let mut connection = self.pool.get()?;

                let entry = connection.transaction::<_, StoreError, _>(|connection| {
                        ConversationRepository::lock_by_id_in(connection, message.conversation_id)?.ok_or_else(
                                || StoreError::NotFound(format!("conversation {} not found", message.conversation_id)),
                        )?;

                        MessageRepository::insert_in(connection, message)?;

                        let head = MessageRepository::find_head_in(connection, message.conversation_id)?
                                .ok_or_else(|| StoreError::Internal("message log is empty after append".to_string()))?;
                        let entry = LastMessageCacheEntry::from(&head);
                        LastMessageCacheRepository::upsert_in(connection, &entry)?;
                        ConversationRepository::touch_in(connection, message.conversation_id, head.timestamp)?;

                        Ok(entry)
                })?;

                info!(
                        conversation_id = message.conversation_id,
                        message_id = message.message_id,
                        "appended message"
                );
                Ok(entry)
        }
}

// Runs only when DATABASE_URL points at a disposable database.
#[cfg(test)]
mod tests {
        use std::sync::{Mutex, OnceLock};
        use std::thread;

        use chrono::{DateTime, Timelike};
        use snowflake::SnowflakeIdGenerator;

        use super::*;
        use crate::services::messenger_service::MessengerService;

        fn store() -> Option<PgStore> {
                let _ = dotenvy::dotenv();
                let config = Config::from_env().unwrap();
                config.database_url.as_ref()?;

                let store = PgStore::connect(&config).unwrap();
                store.ensure_schema().unwrap();
                Some(store)
        }

        fn next_id() -> i64 {
                static IDS: OnceLock<Mutex<SnowflakeIdGenerator>> = OnceLock::new();
                IDS.get_or_init(|| Mutex::new(SnowflakeIdGenerator::new(31, 31)))
                        .lock()
                        .unwrap()
                        .real_time_generate()
        }

        fn at(seconds: i64) -> NaiveDateTime {
                DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap().naive_utc()
        }

        fn open(store: &PgStore) -> Conversation {
                let conversation = Conversation {
                        conversation_id: next_id(),
                        user1_id: next_id(),
                        user2_id: next_id(),
                        last_timestamp: at(0),
                };
                let (opened, created) = store.open_conversation(&conversation).unwrap();
                assert!(created);
                opened
        }

        fn message(conversation: &Conversation, timestamp: i64, message_id: i64, content: &str) -> Message {
                Message {
                        conversation_id: conversation.conversation_id,
                        timestamp: at(timestamp),
                        message_id,
                        content: content.to_string(),
                        sender_id: conversation.user1_id,
                        receiver_id: conversation.user2_id,
                }
        }

        fn assert_cache_is_log_head(store: &PgStore, conversation_id: i64) {
                let head = store.find_messages(conversation_id, MessageQuery::page(0, 1)).unwrap().remove(0);
                let entry = store.find_entry(conversation_id).unwrap().unwrap();
                assert_eq!(entry, LastMessageCacheEntry::from(&head));
        }

        #[test]
        fn append_keeps_cache_on_log_head() {
                let Some(store) = store() else {
                        return;
                };
                let conversation = open(&store);

                for (timestamp, message_id, content) in [(10, 1, "first"), (30, 2, "latest"), (20, 3, "late")] {
                        store.append_message(&message(&conversation, timestamp, message_id, content)).unwrap();
                }

                let entry = store.find_entry(conversation.conversation_id).unwrap().unwrap();
                assert_eq!(entry.last_message.as_deref(), Some("latest"));
                assert_eq!(entry.last_timestamp, at(30));
                assert_eq!(store.find_conversation(conversation.conversation_id).unwrap().unwrap().last_timestamp, at(30));

                let ids: Vec<i64> = store
                        .find_messages(conversation.conversation_id, MessageQuery::page(0, 10))
                        .unwrap()
                        .iter()
                        .map(|m| m.message_id)
                        .collect();
                assert_eq!(ids, vec![2, 3, 1]);
        }

        #[test]
        fn concurrent_appends_leave_cache_on_log_head() {
                let Some(store) = store() else {
                        return;
                };

                for _ in 0..5 {
                        let conversation = open(&store);
                        thread::scope(|scope| {
                                for writer in 0..8_i64 {
                                        let store = store.clone();
                                        let conversation = conversation.clone();
                                        scope.spawn(move || {
                                                for n in 0..10_i64 {
                                                        let sequence = n * 8 + writer;
                                                        store.append_message(&message(
                                                                &conversation,
                                                                sequence,
                                                                sequence,
                                                                &format!("m{sequence}"),
                                                        ))
                                                        .unwrap();
                                                }
                                        });
                                }
                        });

                        assert_eq!(store.count_messages(conversation.conversation_id, None).unwrap(), 80);
                        assert_cache_is_log_head(&store, conversation.conversation_id);
                        let entry = store.find_entry(conversation.conversation_id).unwrap().unwrap();
                        assert_eq!(entry.last_message.as_deref(), Some("m79"));
                }
        }

        #[test]
        fn concurrent_first_contacts_share_one_conversation() {
                let Some(store) = store() else {
                        return;
                };

                for _ in 0..5 {
                        let (user1_id, user2_id) = (next_id(), next_id());
                        let results: Vec<Result<(Conversation, bool), StoreError>> = thread::scope(|scope| {
                                let handles: Vec<_> = (0..8)
                                        .map(|writer| {
                                                let store = store.clone();
                                                let candidate = Conversation {
                                                        conversation_id: next_id(),
                                                        user1_id: if writer % 2 == 0 { user1_id } else { user2_id },
                                                        user2_id: if writer % 2 == 0 { user2_id } else { user1_id },
                                                        last_timestamp: at(0),
                                                };
                                                scope.spawn(move || store.open_conversation(&candidate))
                                        })
                                        .collect();
                                handles.into_iter().map(|handle| handle.join().unwrap()).collect()
                        });

                        let opened: Vec<(Conversation, bool)> =
                                results.into_iter().map(|result| result.unwrap()).collect();
                        assert_eq!(opened.iter().filter(|(_, created)| *created).count(), 1);
                        let winner = opened[0].0.conversation_id;
                        assert!(opened.iter().all(|(conversation, _)| conversation.conversation_id == winner));
                        assert_eq!(store.find_conversation_between(user2_id, user1_id).unwrap().unwrap().conversation_id, winner);
                }
        }

        #[test]
        fn duplicate_message_key_is_a_conflict() {
                let Some(store) = store() else {
                        return;
                };
                let conversation = open(&store);
                store.append_message(&message(&conversation, 5, 1, "original")).unwrap();

                let duplicate = store.append_message(&message(&conversation, 5, 1, "rewrite"));

                assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
                assert_eq!(store.count_messages(conversation.conversation_id, None).unwrap(), 1);
                let entry = store.find_entry(conversation.conversation_id).unwrap().unwrap();
                assert_eq!(entry.last_message.as_deref(), Some("original"));
        }

        #[test]
        fn append_to_unknown_conversation_is_not_found() {
                let Some(store) = store() else {
                        return;
                };
                let missing = Conversation {
                        conversation_id: next_id(),
                        user1_id: 1,
                        user2_id: 2,
                        last_timestamp: at(0),
                };

                let result = store.append_message(&message(&missing, 1, 1, "lost"));

                assert!(matches!(result, Err(StoreError::NotFound(_))));
                assert_eq!(store.count_messages(missing.conversation_id, None).unwrap(), 0);
        }

        #[test]
        fn pages_and_before_filter_follow_clustering_order() {
                let Some(store) = store() else {
                        return;
                };
                let conversation = open(&store);
                for (timestamp, message_id) in [(10, 4), (30, 2), (10, 1), (20, 3), (40, 5)] {
                        store.append_message(&message(&conversation, timestamp, message_id, "x")).unwrap();
                }

                let page: Vec<i64> = store
                        .find_messages(conversation.conversation_id, MessageQuery::page(1, 2))
                        .unwrap()
                        .iter()
                        .map(|m| m.message_id)
                        .collect();
                assert_eq!(page, vec![2, 3]);

                let older: Vec<i64> = store
                        .find_messages(conversation.conversation_id, MessageQuery::page(0, 10).before(at(30)))
                        .unwrap()
                        .iter()
                        .map(|m| m.message_id)
                        .collect();
                assert_eq!(older, vec![3, 1, 4]);
                assert_eq!(store.count_messages(conversation.conversation_id, Some(at(30))).unwrap(), 3);
                assert_eq!(store.count_messages(conversation.conversation_id, None).unwrap(), 5);
        }

        #[test]
        fn user_conversations_are_most_recent_first() {
                let Some(store) = store() else {
                        return;
                };
                let user_id = next_id();
                let mut conversations = Vec::new();
                for timestamp in [10, 30, 20] {
                        let conversation = Conversation {
                                conversation_id: next_id(),
                                user1_id: user_id,
                                user2_id: next_id(),
                                last_timestamp: at(0),
                        };
                        store.open_conversation(&conversation).unwrap();
                        store.append_message(&message(&conversation, timestamp, next_id(), "hi")).unwrap();
                        conversations.push(conversation.conversation_id);
                }

                let listed: Vec<i64> = store
                        .find_conversations_for_user(user_id, 0, 10)
                        .unwrap()
                        .iter()
                        .map(|summary| summary.conversation_id)
                        .collect();
                assert_eq!(listed, vec![conversations[1], conversations[2], conversations[0]]);
                assert_eq!(store.count_conversations_for_user(user_id).unwrap(), 3);
                assert_eq!(store.find_conversations_for_user(user_id, 2, 10).unwrap().len(), 1);
        }

        #[test]
        fn sent_message_matches_stored_row() {
                let Some(store) = store() else {
                        return;
                };
                let service = MessengerService::new(store, &Config::default());
                let (user1_id, user2_id) = (next_id(), next_id());
                let conversation_id: i64 =
                        service.create_or_get_conversation(user1_id, user2_id).unwrap().id.parse().unwrap();

                let sent = service.send_message(conversation_id, user1_id, user2_id, "hello".to_string()).unwrap();
                let precise = at(1).with_nanosecond(987_654_321).unwrap();
                let imported = service
                        .send_message_at(conversation_id, user2_id, user1_id, "earlier".to_string(), precise)
                        .unwrap();

                let read = service.get_conversation_messages(conversation_id, 1, None).unwrap();
                assert_eq!(read.items, vec![sent.clone(), imported.clone()]);

                let before = service.get_messages_before_timestamp(conversation_id, sent.created_at, 1, None).unwrap();
                assert_eq!(before.items, vec![imported]);
        }
}
