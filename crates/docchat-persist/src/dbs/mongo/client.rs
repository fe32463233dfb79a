use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection};

use docchat_types::{Chat, ChatStatus, Message, NewMessage};

use crate::dbs::mongo::models::{MongoChat, MongoMessage};
use crate::error::{PersistError, Result};
use crate::locks::ChatLocks;
use crate::store::{validate_new_message, validate_title, MessageStore, SortOrder};

/// MongoDB-backed store.
///
/// Appends, cascading deletes and retention run inside multi-document
/// transactions, which require a replica set or sharded deployment. Appends to
/// the same chat are additionally serialized in-process so sequence numbers are
/// handed out in request order.
pub struct MongoMessageStore {
    client: Client,
    chats: Collection<MongoChat>,
    messages: Collection<MongoMessage>,
    chat_locks: ChatLocks,
}

impl MongoMessageStore {
    /// Connect to MongoDB and create the store
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB message store");

        Ok(Self {
            chats: db.collection("chats"),
            messages: db.collection("messages"),
            client,
            chat_locks: ChatLocks::new(),
        })
    }

    async fn ensure_chat(&self, chat_id: &str) -> Result<()> {
        match self.chats.find_one(doc! { "_id": chat_id }).await? {
            Some(_) => Ok(()),
            None => Err(PersistError::ChatNotFound(chat_id.to_string())),
        }
    }

    async fn update_chat(&self, chat_id: &str, update: bson::Document) -> Result<Chat> {
        self.chats
            .find_one_and_update(doc! { "_id": chat_id }, update)
            .return_document(ReturnDocument::After)
            .await?
            .map(Chat::from)
            .ok_or_else(|| PersistError::ChatNotFound(chat_id.to_string()))
    }
}

/// Truncate to the millisecond precision BSON dates can hold
fn now_millis() -> DateTime<Utc> {
    bson::DateTime::now().to_chrono()
}

#[async_trait]
impl MessageStore for MongoMessageStore {
    async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat> {
        validate_title(title)?;
        let now = now_millis();
        let mut chat = Chat::new(owner_id, title);
        chat.created_at = now;
        chat.updated_at = now;
        chat.last_activity_at = now;

        self.chats.insert_one(MongoChat::from(chat.clone())).await?;
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        let chat = self.chats.find_one(doc! { "_id": chat_id }).await?;
        Ok(chat.map(Chat::from))
    }

    async fn list_chats(
        &self,
        owner_id: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<Chat>> {
        let mut find = self
            .chats
            .find(doc! { "owner_id": owner_id })
            .sort(doc! { "last_activity_at": -1, "_id": 1 });

        if let Some(limit) = limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(skip) = skip {
            find = find.skip(u64::try_from(skip).unwrap_or(u64::MAX));
        }

        let chats: Vec<MongoChat> = find.await?.try_collect().await?;
        Ok(chats.into_iter().map(Chat::from).collect())
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat> {
        validate_title(title)?;
        let now = bson::DateTime::now();
        self.update_chat(chat_id, doc! { "$set": { "title": title, "updated_at": now } })
            .await
    }

    async fn archive_chat(&self, chat_id: &str) -> Result<Chat> {
        let now = bson::DateTime::now();
        let status = bson::to_bson(&ChatStatus::Archived)?;
        self.update_chat(chat_id, doc! { "$set": { "status": status, "updated_at": now } })
            .await
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let _guard = self.chat_locks.acquire(chat_id).await;

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let deleted = self
            .chats
            .delete_one(doc! { "_id": chat_id })
            .session(&mut session)
            .await?;
        if deleted.deleted_count == 0 {
            return Err(PersistError::ChatNotFound(chat_id.to_string()));
        }
        self.messages
            .delete_many(doc! { "chat_id": chat_id })
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(())
    }

    async fn adjust_document_count(&self, chat_id: &str, delta: i32) -> Result<Chat> {
        let now = bson::DateTime::now();
        // The filter refuses the update when it would go negative
        let filter = doc! {
            "_id": chat_id,
            "document_count": { "$gte": -i64::from(delta.min(0)) },
        };
        let update = doc! {
            "$inc": { "document_count": i64::from(delta) },
            "$set": { "updated_at": now },
        };

        let updated = self
            .chats
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After)
            .await?;

        match updated {
            Some(chat) => Ok(chat.into()),
            None if self.get_chat(chat_id).await?.is_some() => Err(PersistError::validation(
                format!("document count would drop below zero ({:+})", delta),
            )),
            None => Err(PersistError::ChatNotFound(chat_id.to_string())),
        }
    }

    async fn append(&self, chat_id: &str, message: NewMessage) -> Result<Message> {
        let id = uuid::Uuid::new_v4().to_string();
        validate_new_message(&message, &id)?;

        let _guard = self.chat_locks.acquire(chat_id).await;

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let chat = self
            .chats
            .find_one(doc! { "_id": chat_id })
            .session(&mut session)
            .await?
            .ok_or_else(|| PersistError::ChatNotFound(chat_id.to_string()))?;

        if let Some(parent_id) = &message.parent_id {
            let parent = self
                .messages
                .find_one(doc! { "_id": parent_id, "chat_id": chat_id })
                .session(&mut session)
                .await?;
            if parent.is_none() {
                return Err(PersistError::validation(format!(
                    "parent message {} does not belong to chat {}",
                    parent_id, chat_id
                )));
            }
        }

        let created_at = now_millis().max(chat.last_activity_at);
        let persisted = Message {
            id,
            chat_id: chat_id.to_string(),
            seq: u64::try_from(chat.next_seq).unwrap_or(0),
            role: message.role,
            content: message.content,
            created_at,
            parent_id: message.parent_id,
            metrics: message.metrics,
        };

        self.messages
            .insert_one(MongoMessage::from(persisted.clone()))
            .session(&mut session)
            .await?;

        let activity = bson::DateTime::from_chrono(created_at);
        self.chats
            .update_one(
                doc! { "_id": chat_id },
                doc! {
                    "$inc": { "message_count": 1_i64, "next_seq": 1_i64 },
                    "$set": { "last_activity_at": activity, "updated_at": activity },
                },
            )
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(persisted)
    }

    async fn list_ordered(
        &self,
        chat_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        self.ensure_chat(chat_id).await?;

        let direction = match order {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        };
        let mut find = self
            .messages
            .find(doc! { "chat_id": chat_id })
            .sort(doc! { "created_at": direction, "seq": direction });
        if let Some(limit) = limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let messages: Vec<MongoMessage> = find.await?.try_collect().await?;
        Ok(messages.into_iter().map(Message::from).collect())
    }

    async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Option<Message>> {
        let message = self
            .messages
            .find_one(doc! { "_id": message_id, "chat_id": chat_id })
            .await?;
        Ok(message.map(Message::from))
    }

    async fn count_since(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ensure_chat(chat_id).await?;
        let filter = doc! {
            "chat_id": chat_id,
            "created_at": { "$gte": bson::DateTime::from_chrono(cutoff) },
        };
        Ok(self.messages.count_documents(filter).await?)
    }

    async fn delete_older_than(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let _guard = self.chat_locks.acquire(chat_id).await;

        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let chat = self
            .chats
            .find_one(doc! { "_id": chat_id })
            .session(&mut session)
            .await?
            .ok_or_else(|| PersistError::ChatNotFound(chat_id.to_string()))?;

        let deleted = self
            .messages
            .delete_many(doc! {
                "chat_id": chat_id,
                "created_at": { "$lt": bson::DateTime::from_chrono(cutoff) },
            })
            .session(&mut session)
            .await?
            .deleted_count;

        if deleted == 0 {
            session.abort_transaction().await?;
            return Ok(0);
        }

        let deleted_i64 = i64::try_from(deleted).unwrap_or(i64::MAX);
        if chat.message_count < deleted_i64 {
            tracing::error!(
                chat_id = %chat_id,
                counter = chat.message_count,
                deleted,
                "Retention would drive message counter negative"
            );
            session.abort_transaction().await?;
            return Err(PersistError::Consistency {
                chat_id: chat_id.to_string(),
                detail: format!(
                    "deleting {} messages but counter is {}",
                    deleted, chat.message_count
                ),
            });
        }

        self.chats
            .update_one(
                doc! { "_id": chat_id },
                doc! {
                    "$inc": { "message_count": -deleted_i64 },
                    "$set": { "updated_at": bson::DateTime::now() },
                },
            )
            .session(&mut session)
            .await?;

        session.commit_transaction().await?;
        Ok(deleted)
    }
}
