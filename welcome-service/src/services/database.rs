use crate::models::{ButtonRows, ContentNode, FormatMode, GroupRecord, GroupStats, WelcomeSettings};
use crate::services::store::{ChatRegistry, NodeStore, seed_from_settings};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    Client as MongoClient, Collection, Database, IndexModel,
    bson::{self, Bson, Document, doc},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument, UpdateOptions},
};
use service_core::error::AppError;

const NODE_SEQUENCE: &str = "welcome_node_id";

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB at {}: {}", uri, e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for welcome-service");

        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };

        self.groups()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "chat_id": 1 })
                    .options(unique("group_chat_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.welcome_settings()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "chat_id": 1 })
                    .options(unique("settings_chat_lookup"))
                    .build(),
                None,
            )
            .await?;

        self.nodes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "node_id": 1 })
                    .options(unique("node_id_lookup"))
                    .build(),
                None,
            )
            .await?;

        // Compound index for chat-scoped child listings
        self.nodes()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "chat_id": 1, "parent_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .name("node_parent_lookup".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.stats()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "chat_id": 1 })
                    .options(unique("stats_chat_lookup"))
                    .build(),
                None,
            )
            .await?;

        tracing::info!("MongoDB indexes ready");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    /// Atomic next-sequence primitive. All node id assignment funnels through
    /// this one counter document, so concurrent creations never collide.
    pub async fn next_sequence(&self, name: &str) -> Result<i64, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let doc = self
            .counters()
            .find_one_and_update(doc! { "_id": name }, doc! { "$inc": { "seq": 1 } }, options)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!("counter {} missing after upsert", name))
            })?;
        match doc.get("seq") {
            Some(Bson::Int64(v)) => Ok(*v),
            Some(Bson::Int32(v)) => Ok(*v as i64),
            other => Err(AppError::DatabaseError(anyhow::anyhow!(
                "counter {} has non-integer seq: {:?}",
                name,
                other
            ))),
        }
    }

    pub fn nodes(&self) -> Collection<ContentNode> {
        self.db.collection("welcome_nodes")
    }

    pub fn groups(&self) -> Collection<GroupRecord> {
        self.db.collection("groups")
    }

    pub fn welcome_settings(&self) -> Collection<WelcomeSettings> {
        self.db.collection("welcome_settings")
    }

    pub fn stats(&self) -> Collection<GroupStats> {
        self.db.collection("stats")
    }

    pub fn counters(&self) -> Collection<Document> {
        self.db.collection("counters")
    }
}

/// Mongo-backed node store and chat registry.
#[derive(Clone)]
pub struct MongoStore {
    db: MongoDb,
}

impl MongoStore {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NodeStore for MongoStore {
    async fn get_node(&self, id: i64) -> Result<Option<ContentNode>, AppError> {
        Ok(self.db.nodes().find_one(doc! { "node_id": id }, None).await?)
    }

    async fn get_root(&self, chat_id: i64) -> Result<ContentNode, AppError> {
        if let Some(root) = self
            .db
            .nodes()
            .find_one(doc! { "chat_id": chat_id, "parent_id": Bson::Null }, None)
            .await?
        {
            return Ok(root);
        }

        let settings = self.welcome_settings(chat_id).await?;
        let seed = seed_from_settings(settings.as_ref());
        let id = self
            .create_node(chat_id, None, &seed.text, seed.format_mode, seed.image_url)
            .await?;
        self.get_node(id).await?.ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("root node {} vanished after creation", id))
        })
    }

    async fn get_children(
        &self,
        chat_id: i64,
        parent_id: i64,
    ) -> Result<Vec<ContentNode>, AppError> {
        let options = FindOptions::builder().sort(doc! { "node_id": 1 }).build();
        let cursor = self
            .db
            .nodes()
            .find(doc! { "chat_id": chat_id, "parent_id": parent_id }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn create_node(
        &self,
        chat_id: i64,
        parent_id: Option<i64>,
        text: &str,
        format_mode: FormatMode,
        image_url: Option<String>,
    ) -> Result<i64, AppError> {
        let id = self.db.next_sequence(NODE_SEQUENCE).await?;
        let node = ContentNode {
            id,
            chat_id,
            parent_id,
            text: text.to_string(),
            image_url,
            format_mode,
            buttons: Vec::new(),
        };
        self.db.nodes().insert_one(node, None).await?;
        Ok(id)
    }

    async fn delete_node(&self, id: i64) -> Result<(), AppError> {
        self.db.nodes().delete_one(doc! { "node_id": id }, None).await?;
        Ok(())
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<(), AppError> {
        self.db
            .nodes()
            .update_one(doc! { "node_id": id }, doc! { "$set": { "text": text } }, None)
            .await?;
        Ok(())
    }

    async fn update_image(&self, id: i64, image_url: Option<&str>) -> Result<(), AppError> {
        let value = match image_url {
            Some(url) => Bson::String(url.to_string()),
            None => Bson::Null,
        };
        self.db
            .nodes()
            .update_one(
                doc! { "node_id": id },
                doc! { "$set": { "image_url": value } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn update_format_mode(&self, id: i64, mode: FormatMode) -> Result<(), AppError> {
        self.db
            .nodes()
            .update_one(
                doc! { "node_id": id },
                doc! { "$set": { "parse_mode": mode.as_str() } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn update_buttons(&self, id: i64, rows: &ButtonRows) -> Result<(), AppError> {
        let rows = bson::to_bson(rows).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("failed to encode buttons: {}", e))
        })?;
        self.db
            .nodes()
            .update_one(
                doc! { "node_id": id },
                doc! { "$set": { "buttons": rows } },
                None,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatRegistry for MongoStore {
    async fn upsert_group(&self, group: &GroupRecord) -> Result<(), AppError> {
        let upsert = UpdateOptions::builder().upsert(true).build();

        let mut fields = bson::to_document(group).map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("failed to encode group: {}", e))
        })?;
        fields.remove("_id");
        self.db
            .groups()
            .update_one(
                doc! { "chat_id": group.chat_id },
                doc! { "$set": fields },
                upsert.clone(),
            )
            .await?;

        self.db
            .welcome_settings()
            .update_one(
                doc! { "chat_id": group.chat_id },
                doc! { "$setOnInsert": {
                    "enabled": true,
                    "message": crate::config::DEFAULT_WELCOME_MESSAGE,
                    "image_url": Bson::Null,
                    "parse_mode": FormatMode::Html.as_str(),
                } },
                upsert.clone(),
            )
            .await?;

        self.db
            .stats()
            .update_one(
                doc! { "chat_id": group.chat_id },
                doc! { "$setOnInsert": {
                    "welcomes_sent": 0_i64,
                    "last_activity": Bson::DateTime(bson::DateTime::now()),
                } },
                upsert,
            )
            .await?;

        Ok(())
    }

    async fn get_group(&self, chat_id: i64) -> Result<Option<GroupRecord>, AppError> {
        Ok(self
            .db
            .groups()
            .find_one(doc! { "chat_id": chat_id }, None)
            .await?)
    }

    async fn active_groups(&self) -> Result<Vec<GroupRecord>, AppError> {
        let options = FindOptions::builder().sort(doc! { "added_date": -1 }).build();
        let cursor = self.db.groups().find(doc! { "active": true }, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn deactivate_group(&self, chat_id: i64) -> Result<(), AppError> {
        self.db
            .groups()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! { "$set": { "active": false } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn update_group_info(
        &self,
        chat_id: i64,
        title: &str,
        member_count: Option<i64>,
        is_forum: Option<bool>,
    ) -> Result<(), AppError> {
        let mut update = doc! { "title": title };
        if let Some(count) = member_count {
            update.insert("member_count", count);
        }
        if let Some(forum) = is_forum {
            update.insert("is_forum", forum);
        }
        self.db
            .groups()
            .update_one(doc! { "chat_id": chat_id }, doc! { "$set": update }, None)
            .await?;
        Ok(())
    }

    async fn set_welcome_thread(
        &self,
        chat_id: i64,
        thread_id: Option<i64>,
    ) -> Result<(), AppError> {
        let value = match thread_id {
            Some(id) => Bson::Int64(id),
            None => Bson::Null,
        };
        self.db
            .groups()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! { "$set": { "welcome_thread_id": value } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn welcome_settings(&self, chat_id: i64) -> Result<Option<WelcomeSettings>, AppError> {
        Ok(self
            .db
            .welcome_settings()
            .find_one(doc! { "chat_id": chat_id }, None)
            .await?)
    }

    async fn update_welcome_message(&self, chat_id: i64, message: &str) -> Result<(), AppError> {
        self.db
            .welcome_settings()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! { "$set": { "message": message } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }

    async fn toggle_welcome(&self, chat_id: i64) -> Result<bool, AppError> {
        let current = self
            .welcome_settings(chat_id)
            .await?
            .map(|s| s.enabled)
            .unwrap_or(true);
        let next = !current;
        self.db
            .welcome_settings()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! { "$set": { "enabled": next } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(next)
    }

    async fn group_stats(&self, chat_id: i64) -> Result<Option<GroupStats>, AppError> {
        Ok(self
            .db
            .stats()
            .find_one(doc! { "chat_id": chat_id }, None)
            .await?)
    }

    async fn record_welcome_sent(&self, chat_id: i64) -> Result<(), AppError> {
        self.db
            .stats()
            .update_one(
                doc! { "chat_id": chat_id },
                doc! {
                    "$inc": { "welcomes_sent": 1_i64 },
                    "$set": { "last_activity": Bson::DateTime(bson::DateTime::now()) },
                },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await?;
        Ok(())
    }
}
