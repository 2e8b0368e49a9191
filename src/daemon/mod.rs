use std::{net::SocketAddr, path::Path};

use anyhow::Result;
use processing::{requests::TrackerHandle, tracker::Tracker, ProcessingModule};
use storage::{config_storage::ConfigStorage, month_storage::MonthStorageImpl};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::clock::{Clock, DefaultClock};

pub mod args;
pub mod processing;
pub mod routes;
pub mod shutdown;
pub mod storage;

pub const DEFAULT_PORT: u16 = 8097;

const REQUEST_BUFFER: usize = 32;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: &Path, address: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Listening on {}", listener.local_addr()?);

    let shutdown_token = CancellationToken::new();

    let (_, serving_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        serve(listener, dir, DefaultClock, shutdown_token),
    );

    serving_result
}

/// Serves the api on `listener` until `shutdown` is cancelled. Requests still in flight are
/// answered before returning.
pub async fn serve(
    listener: TcpListener,
    dir: &Path,
    clock: impl Clock,
    shutdown: CancellationToken,
) -> Result<()> {
    let (sender, receiver) = mpsc::channel(REQUEST_BUFFER);
    let processor = create_processor(dir, receiver, clock)?;
    let app = routes::router(TrackerHandle::new(sender));

    let server = {
        let shutdown = shutdown.clone();
        async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await;
            // Also stops signal detection when the server fails on its own.
            shutdown.cancel();
            result
        }
    };

    let (server_result, processing_result) = tokio::join!(server, processor.run());

    if let Err(e) = &processing_result {
        error!("Processing module got an error {e:?}");
    }
    server_result?;
    processing_result
}

fn create_processor(
    dir: &Path,
    receiver: mpsc::Receiver<processing::requests::TrackerRequest>,
    clock: impl Clock,
) -> Result<ProcessingModule<Tracker<MonthStorageImpl>>> {
    let storage = MonthStorageImpl::new(dir.join("records"))?;
    let tracker = Tracker::new(
        storage,
        ConfigStorage::new(dir.to_path_buf()),
        Box::new(clock),
    );
    Ok(ProcessingModule::new(receiver, tracker))
}
