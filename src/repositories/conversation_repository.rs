use derive_new::new;
use diesel::prelude::*;

use crate::errors::store_error::StoreError;
use crate::models::Conversation;
use crate::schema::conversations;
use crate::DbPool;

#[derive(new, Debug, Clone)]
pub struct ConversationRepository {
        pool: DbPool,
}

impl ConversationRepository {
        pub fn find_by_id(&self, conversation_id: i64) -> Result<Option<Conversation>, StoreError> {
                let mut connection = self.pool.get()?;
                Self::find_by_id_in(&mut connection, conversation_id)
        }

        pub fn find_by_participants(&self, user1_id: i64, user2_id: i64) -> Result<Option<Conversation>, StoreError> {
                let mut connection = self.pool.get()?;
                Self::find_by_participants_in(&mut connection, user1_id, user2_id)
        }

        pub(crate) fn find_by_id_in(
                connection: &mut PgConnection,
                conversation_id: i64,
        ) -> Result<Option<Conversation>, StoreError> {
                Ok(conversations::table
                        .filter(conversations::conversation_id.eq(conversation_id))
                        .select(Conversation::as_select())
                        .first(connection)
                        .optional()?)
        }

        /// Same as [`Self::find_by_id_in`] but holds a row lock until the transaction ends, so writers to one
        /// conversation queue behind each other.
        pub(crate) fn lock_by_id_in(
                connection: &mut PgConnection,
                conversation_id: i64,
        ) -> Result<Option<Conversation>, StoreError> {
                Ok(conversations::table
                        .filter(conversations::conversation_id.eq(conversation_id))
                        .select(Conversation::as_select())
                        .for_update()
                        .first(connection)
                        .optional()?)
        }

        pub(crate) fn find_by_participants_in(
                connection: &mut PgConnection,
                user1_id: i64,
                user2_id: i64,
        ) -> Result<Option<Conversation>, StoreError> {
                Ok(conversations::table
                        .filter(
                                conversations::user1_id
                                        .eq(user1_id)
                                        .and(conversations::user2_id.eq(user2_id))
                                        .or(conversations::user1_id
                                                .eq(user2_id)
                                                .and(conversations::user2_id.eq(user1_id))),
                        )
                        .order_by(conversations::conversation_id)
                        .select(Conversation::as_select())
                        .first(connection)
                        .optional()?)
        }

        pub(crate) fn insert_in(connection: &mut PgConnection, conversation: &Conversation) -> Result<(), StoreError> {
                diesel::insert_into(conversations::table)
                        .values(conversation)
                        .execute(connection)?;

                Ok(())
        }

        /// Moves last activity forward; never backwards.
        pub(crate) fn touch_in(
                connection: &mut PgConnection,
                conversation_id: i64,
                timestamp: chrono::NaiveDateTime,
        ) -> Result<(), StoreError> {
                diesel::update(
                        conversations::table
                                .filter(conversations::conversation_id.eq(conversation_id))
                                .filter(conversations::last_timestamp.lt(timestamp)),
                )
                .set(conversations::last_timestamp.eq(timestamp))
                .execute(connection)?;

                Ok(())
        }
}
