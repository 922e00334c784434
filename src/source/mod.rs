pub mod dir;

use tokio::sync::mpsc;

use crate::error::{AppError, Result};
use crate::protocol::BrowserRequest;

/// Transport that carries range-fetch requests to the remote side.
///
/// Submission is fire-and-forget; the reply comes back later through
/// `BrowserModel::process_response`.
pub trait RemoteSource {
    fn submit(&mut self, request: BrowserRequest) -> Result<()>;
}

impl RemoteSource for mpsc::UnboundedSender<BrowserRequest> {
    fn submit(&mut self, request: BrowserRequest) -> Result<()> {
        self.send(request).map_err(|e| {
            AppError::Source(format!("request for '{}' dropped: channel closed", e.0.path))
        })
    }
}
