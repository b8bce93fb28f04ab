//! Production [`DocumentStore`] adapter backed by the official `mongodb`
//! driver, with mutual-TLS via a client certificate (`certpath` from
//! config). A config struct plus an async `connect` constructor that
//! logs on success, with driver errors mapped into the domain's own
//! error type rather than leaking the driver's.

use crate::domain::errors::DbError;
use crate::domain::ports::{ChangeEvent, ChangeSubscription, Collection, DocumentStore};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ChangeStreamOptions, ClientOptions, FullDocumentType, Tls, TlsOptions};
use mongodb::{Client, Database};
use std::path::PathBuf;
use tracing::info;

/// Connection parameters read from the `[mongodb]` section of the
/// local `.ini` configuration.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub connection_string: String,
    pub cert_path: PathBuf,
    pub db_name: String,
}

/// `mongodb`-backed [`DocumentStore`]. One instance is constructed at
/// startup and shared (via `Arc`) across every periodic service.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect using mutual TLS, with `certpath` from config supplying
    /// both the client certificate and the CA bundle (a single combined
    /// PEM file).
    pub async fn connect(config: &MongoConfig) -> Result<Self, DbError> {
        let mut options = ClientOptions::parse(&config.connection_string)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        options.tls = Some(Tls::Enabled(
            TlsOptions::builder()
                .ca_file_path(config.cert_path.clone())
                .cert_key_file_path(config.cert_path.clone())
                .build(),
        ));

        let client = Client::with_options(options).map_err(|e| DbError::Connection(e.to_string()))?;
        let db = client.database(&config.db_name);

        info!(db = %config.db_name, "connected to mongodb");
        Ok(Self { db })
    }

    fn collection(&self, collection: Collection) -> mongodb::Collection<Document> {
        self.db.collection(collection.name())
    }
}

fn to_document(value: serde_json::Value) -> Result<Document, DbError> {
    mongodb::bson::to_document(&value).map_err(|e| DbError::Connection(e.to_string()))
}

fn to_json(document: Document) -> Result<serde_json::Value, DbError> {
    mongodb::bson::from_document(document).map_err(|e| DbError::Connection(e.to_string()))
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), DbError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn count_documents(&self, collection: Collection) -> Result<u64, DbError> {
        Ok(self.collection(collection).count_documents(doc! {}).await?)
    }

    async fn insert_one(&self, collection: Collection, document: serde_json::Value) -> Result<(), DbError> {
        self.collection(collection).insert_one(to_document(document)?).await?;
        Ok(())
    }

    async fn insert_many(&self, collection: Collection, documents: Vec<serde_json::Value>) -> Result<(), DbError> {
        if documents.is_empty() {
            return Ok(());
        }
        let docs = documents
            .into_iter()
            .map(to_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.collection(collection).insert_many(docs).await?;
        Ok(())
    }

    async fn find_one_and_replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), DbError> {
        self.collection(collection)
            .find_one_and_replace(doc! { "id": id }, to_document(document)?)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_ids(&self, collection: Collection) -> Result<Vec<String>, DbError> {
        let mut cursor = self
            .collection(collection)
            .find(doc! {})
            .projection(doc! { "id": 1 })
            .await?;
        let mut ids = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            if let Some(id) = document.get_str("id").ok() {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn find_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, DbError> {
        let document = self.collection(collection).find_one(to_document(query)?).await?;
        document.map(to_json).transpose()
    }

    async fn update_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
        fields: serde_json::Value,
    ) -> Result<(), DbError> {
        self.collection(collection)
            .update_one(to_document(query)?, doc! { "$set": to_document(fields)? })
            .await?;
        Ok(())
    }

    async fn watch(
        &self,
        collection: Collection,
        resume_token: Option<serde_json::Value>,
    ) -> Result<Box<dyn ChangeSubscription>, DbError> {
        let mut options = ChangeStreamOptions::builder()
            .full_document(Some(FullDocumentType::UpdateLookup))
            .build();
        if let Some(token) = resume_token {
            options.resume_after = mongodb::bson::from_bson(
                mongodb::bson::to_bson(&token).map_err(|e| DbError::Connection(e.to_string()))?,
            )
            .ok();
        }
        let stream = self
            .collection(collection)
            .watch()
            .with_options(options)
            .await?;
        Ok(Box::new(MongoChangeSubscription { stream }))
    }
}

/// Wraps the driver's change stream, reducing each event to the dotted
/// `section.option` keys [`crate::services::remote_config`] applies.
struct MongoChangeSubscription {
    stream: mongodb::change_stream::ChangeStream<mongodb::change_stream::event::ChangeStreamEvent<Document>>,
}

#[async_trait]
impl ChangeSubscription for MongoChangeSubscription {
    async fn next(&mut self) -> Result<Option<ChangeEvent>, DbError> {
        match self.stream.try_next().await? {
            None => Ok(None),
            Some(event) => {
                let resume_token = event
                    .id
                    .clone()
                    .map(|t| serde_json::to_value(t).unwrap_or(serde_json::Value::Null))
                    .unwrap_or(serde_json::Value::Null);
                let updated_fields = event
                    .update_description
                    .map(|desc| {
                        desc.updated_fields
                            .into_iter()
                            .filter_map(|(key, value)| {
                                to_json(doc! { "v": value }).ok().and_then(|v| v.get("v").cloned()).map(|v| (key, v))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Some(ChangeEvent {
                    updated_fields,
                    resume_token,
                }))
            }
        }
    }
}
