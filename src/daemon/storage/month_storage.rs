use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use crate::{
    history::{event_log::EventLog, reconcile::PreviousMonthProvider},
    utils::time::{month_to_record_name, YearMonth},
};

use super::entities::EventEntity;

/// Interface for abstracting storage of month logs.
pub trait MonthStorage {
    /// Loads the log of a month. A month without a record is an empty log.
    fn load(&self, month: YearMonth) -> impl Future<Output = Result<EventLog>> + Send;

    /// Overwrites the record of the log's month.
    fn save(&self, log: &EventLog) -> impl Future<Output = Result<()>> + Send;
}

impl<T: Deref + Sync> MonthStorage for T
where
    T::Target: MonthStorage + Sync,
{
    fn load(&self, month: YearMonth) -> impl Future<Output = Result<EventLog>> + Send {
        self.deref().load(month)
    }

    fn save(&self, log: &EventLog) -> impl Future<Output = Result<()>> + Send {
        self.deref().save(log)
    }
}

/// Serialized form of a month log. This is also the form used for downloads and imports.
pub fn serialize_events(events: &[EventEntity]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(events)?)
}

/// The main realization of [MonthStorage]. Every month is a json array in its own file.
pub struct MonthStorageImpl {
    record_dir: PathBuf,
}

impl MonthStorageImpl {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn path_for(&self, month: YearMonth) -> PathBuf {
        self.record_dir.join(month_to_record_name(month))
    }

    async fn load_inner(path: &Path) -> Result<Vec<EventEntity>> {
        async fn read(path: &Path) -> std::result::Result<String, std::io::Error> {
            debug!("Reading {path:?}");
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut data = String::new();
            let result = file.read_to_string(&mut data).await;
            file.unlock_async().await?;
            result?;
            Ok(data)
        }

        let data = match read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => Err(e)?,
        };

        if data.trim().is_empty() {
            return Ok(vec![]);
        }

        let values = serde_json::from_str::<Vec<serde_json::Value>>(&data)?;
        let mut events = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<EventEntity>(value.clone()) {
                Ok(v) => events.push(v),
                Err(e) => {
                    // Hand edited or imported files might contain garbage, it shouldn't make the
                    // whole month unreadable.
                    warn!("In {path:?} found illegal event {value}: {e}")
                }
            }
        }
        Ok(events)
    }

    async fn save_inner(path: &Path, data: &[u8]) -> Result<()> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await?;

        // Truncate only after the lock is taken so readers never see a half written month.
        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        result?;
        Ok(())
    }
}

impl MonthStorage for MonthStorageImpl {
    async fn load(&self, month: YearMonth) -> Result<EventLog> {
        let events = Self::load_inner(&self.path_for(month)).await?;
        Ok(EventLog::from_events(month, events))
    }

    async fn save(&self, log: &EventLog) -> Result<()> {
        let data = serialize_events(log.events())?;
        Self::save_inner(&self.path_for(log.month()), &data).await?;
        debug!("Saved {} events of {}", log.len(), log.month());
        Ok(())
    }
}

/// Exposes a [MonthStorage] to the reconciler as its previous month lookup.
pub struct StoredPreviousMonth<'a, S>(pub &'a S);

#[async_trait]
impl<S: MonthStorage + Sync> PreviousMonthProvider for StoredPreviousMonth<'_, S> {
    async fn previous_month(&self, month: YearMonth) -> Result<EventLog> {
        self.0.load(month.previous()).await
    }
}
