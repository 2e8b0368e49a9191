use anyhow::Result;

use super::requests::TrackerRequest;

/// Represents a request processor. Requests are handled one at a time, which makes the processor
/// the only writer of month logs.
pub trait RequestProcessor {
    fn process_next(
        &mut self,
        request: TrackerRequest,
    ) -> impl std::future::Future<Output = Result<()>>;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
