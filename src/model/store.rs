//! Durable homes for the recorded event log.

use std::sync::Arc;

use mongodb::{bson::doc, options::FindOptions, Database};
use rocket::futures::TryStreamExt;
use rocket::tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{
    event::RecordedEvent,
    mongodb::{ensure_indexes_exist, Coll},
};

/// An append-only log of recorded events.
#[rocket::async_trait]
pub trait EventStore: Send + Sync {
    /// Every recorded event, in sequence order.
    async fn load(&self) -> Result<Vec<RecordedEvent>>;

    /// Persist one record. On error nothing is persisted.
    async fn append(&self, record: &RecordedEvent) -> Result<()>;
}

/// Keeps the log in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    records: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing log, e.g. an export.
    pub fn with_records(records: Vec<RecordedEvent>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

#[rocket::async_trait]
impl EventStore for MemoryEventStore {
    async fn load(&self) -> Result<Vec<RecordedEvent>> {
        Ok(self.records.lock().await.clone())
    }

    async fn append(&self, record: &RecordedEvent) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Keeps one document per recorded event.
pub struct MongoEventStore {
    events: Coll<RecordedEvent>,
}

impl MongoEventStore {
    /// Use the given database, creating the indexes the log needs.
    pub async fn new(db: &Database) -> Result<Self> {
        ensure_indexes_exist(db).await?;
        Ok(Self {
            events: Coll::from_db(db),
        })
    }
}

#[rocket::async_trait]
impl EventStore for MongoEventStore {
    async fn load(&self) -> Result<Vec<RecordedEvent>> {
        let options = FindOptions::builder().sort(doc! {"sequence": 1}).build();
        let records = self
            .events
            .find(None, options)
            .await?
            .try_collect()
            .await?;
        Ok(records)
    }

    async fn append(&self, record: &RecordedEvent) -> Result<()> {
        self.events.insert_one(record, None).await?;
        Ok(())
    }
}
