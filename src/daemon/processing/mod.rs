use anyhow::Result;
use module::RequestProcessor;
use requests::TrackerRequest;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

pub mod error;
pub mod module;
pub mod requests;
pub mod tracker;

/// Represents the single writer of month logs. This module is responsible for receiving requests
/// and handing them one by one to the processor.
pub struct ProcessingModule<Processor> {
    receiver: Receiver<TrackerRequest>,
    processor: Processor,
}

impl<P: RequestProcessor> ProcessingModule<P> {
    pub fn new(receiver: Receiver<TrackerRequest>, processor: P) -> Self {
        Self {
            receiver,
            processor,
        }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(request) = self.receiver.recv().await {
            let name = request.name();
            debug!("Processing request {name}");
            match self.processor.process_next(request).await {
                Ok(_) => {
                    info!("Processed request {name}")
                }
                Err(e) => {
                    error!("Error processing request {name}: {e:?}")
                }
            }
        }

        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, TimeDelta};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use crate::{
        daemon::{
            processing::{requests::TrackerHandle, tracker::Tracker},
            storage::{
                config_storage::ConfigStorage, entities::Presence,
                month_storage::MonthStorageImpl,
            },
        },
        history::reconcile::Decision,
        utils::{clock::MockClock, logging::TEST_LOGGING, time::local_instant},
    };

    use super::{error::TrackerError, ProcessingModule};

    #[tokio::test]
    async fn test_requests_are_answered_in_order() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let now = local_instant(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap(), 12, 0).unwrap();
        let mut clock = MockClock::new();
        clock.expect_time().returning(move || now);
        let tracker = Tracker::new(
            MonthStorageImpl::new(dir.path().join("records"))?,
            ConfigStorage::new(dir.path().to_path_buf()),
            Box::new(clock),
        );

        let (sender, receiver) = mpsc::channel(10);
        let handle = TrackerHandle::new(sender);
        let processor = ProcessingModule::new(receiver, tracker);

        let (processing_result, ()) = tokio::join!(processor.run(), async move {
            let enter = now - TimeDelta::hours(3);
            assert_eq!(
                handle.submit(Presence::Enter, Some(enter)).await.unwrap(),
                Decision::Insert
            );
            assert!(matches!(
                handle.submit(Presence::Exit, Some(enter)).await,
                Err(TrackerError::Duplicate(_))
            ));
            let session = handle.session().await.unwrap();
            assert_eq!(session.session_time, TimeDelta::hours(3));
            assert!(session.is_at_work);
            assert_eq!(handle.history(None).await.unwrap().len(), 1);
            // Dropping the handle stops processing.
        });

        processing_result
    }

    #[tokio::test]
    async fn test_handle_without_processor() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = TrackerHandle::new(sender);
        assert!(matches!(
            handle.session().await,
            Err(TrackerError::Unavailable)
        ));
    }
}
