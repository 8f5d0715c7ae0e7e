use derive_new::new;
use diesel::prelude::*;

use crate::errors::store_error::StoreError;
use crate::models::{Conversation, ConversationSummary, LastMessageCacheEntry};
use crate::schema::{conversations, last_message_cache};
use crate::DbPool;

#[derive(new, Debug, Clone)]
pub struct LastMessageCacheRepository {
        pool: DbPool,
}

impl LastMessageCacheRepository {
        pub fn find_by_conversation_id(&self, conversation_id: i64) -> Result<Option<LastMessageCacheEntry>, StoreError> {
                let mut connection = self.pool.get()?;

                Ok(last_message_cache::table
                        .find(conversation_id)
                        .select(LastMessageCacheEntry::as_select())
                        .first(&mut connection)
                        .optional()?)
        }

        pub fn find_by_user_id(
                &self,
                user_id: i64,
                offset: i64,
                limit: i64,
        ) -> Result<Vec<ConversationSummary>, StoreError> {
                let mut connection = self.pool.get()?;

                let rows = conversations::table
                        .inner_join(
                                last_message_cache::table
                                        .on(last_message_cache::conversation_id.eq(conversations::conversation_id)),
                        )
                        .filter(conversations::user1_id.eq(user_id).or(conversations::user2_id.eq(user_id)))
                        .order_by((last_message_cache::last_timestamp.desc(), conversations::conversation_id.asc()))
                        .offset(offset)
                        .limit(limit)
                        .select((Conversation::as_select(), LastMessageCacheEntry::as_select()))
                        .load::<(Conversation, LastMessageCacheEntry)>(&mut connection)?;

                Ok(rows.into_iter().map(ConversationSummary::from).collect())
        }

        pub fn count_by_user_id(&self, user_id: i64) -> Result<i64, StoreError> {
                let mut connection = self.pool.get()?;

                Ok(conversations::table
                        .inner_join(
                                last_message_cache::table
                                        .on(last_message_cache::conversation_id.eq(conversations::conversation_id)),
                        )
                        .filter(conversations::user1_id.eq(user_id).or(conversations::user2_id.eq(user_id)))
                        .count()
                        .get_result(&mut connection)?)
        }

        pub(crate) fn upsert_in(connection: &mut PgConnection, entry: &LastMessageCacheEntry) -> Result<(), StoreError> {
                diesel::insert_into(last_message_cache::table)
                        .values(entry)
                        .on_conflict(last_message_cache::conversation_id)
                        .do_update()
                        .set(entry)
                        .execute(connection)?;

                Ok(())
        }
}
