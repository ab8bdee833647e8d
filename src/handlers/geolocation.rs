use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use crate::models::error::LocationError;
use crate::models::position::{Coordinate, PositionOptions};
use crate::models::updates::OutboundMessage;

pub type PositionStream = BoxStream<'static, Result<Coordinate, LocationError>>;

/// The device's location capability.
///
/// `watch_position` yields fixes and errors until the stream is dropped;
/// dropping it must release the underlying watch.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn current_position(&self, options: PositionOptions) -> Result<Coordinate, LocationError>;

    fn watch_position(&self, options: PositionOptions) -> PositionStream;
}

type Reply = Result<Coordinate, LocationError>;

/// Extra wait on top of the device-side timeout before giving up on a
/// one-shot request whose answer never arrives.
const REPLY_GRACE: Duration = Duration::from_secs(2);

/// Geolocation driven through the browser on the other end of the socket.
/// Requests go out as `OutboundMessage`s; answers come back through `dispatch`.
pub struct WebSocketGeolocation {
    supported: bool,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    requests: Arc<DashMap<u64, mpsc::UnboundedSender<Reply>>>,
    next_id: AtomicU64,
}

struct RequestGuard {
    id: u64,
    requests: Arc<DashMap<u64, mpsc::UnboundedSender<Reply>>>,
    // set for watches, which need an explicit clear on the device
    clear_on: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.requests.remove(&self.id);
        if let Some(outbound) = &self.clear_on {
            debug!("Clearing watch {}", self.id);
            outbound.send(OutboundMessage::ClearWatch { id: self.id }).ok();
        }
    }
}

impl WebSocketGeolocation {
    pub fn new(supported: bool, outbound: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            supported,
            outbound,
            requests: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self) -> (u64, mpsc::UnboundedReceiver<Reply>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.requests.insert(id, tx);
        (id, rx)
    }

    /// Routes a device answer to the request or watch it belongs to.
    /// Returns `false` when nobody is listening for `id` any more.
    pub fn dispatch(&self, id: u64, reply: Reply) -> bool {
        match self.requests.get(&id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                debug!("Dropping answer for stale request {}", id);
                false
            }
        }
    }

    #[cfg(test)]
    pub fn active_requests(&self) -> usize {
        self.requests.len()
    }
}

#[async_trait]
impl GeolocationProvider for WebSocketGeolocation {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn current_position(&self, options: PositionOptions) -> Result<Coordinate, LocationError> {
        if !self.supported {
            return Err(LocationError::Unsupported);
        }
        let (id, mut rx) = self.register();
        let _guard = RequestGuard { id, requests: self.requests.clone(), clear_on: None };

        self.outbound.send(OutboundMessage::GetCurrentPosition { id, options })
            .map_err(|_| LocationError::Unknown("device disconnected".to_string()))?;

        let wait = Duration::from_millis(options.timeout_ms) + REPLY_GRACE;
        match tokio::time::timeout(wait, rx.recv()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => Err(LocationError::Unknown("device disconnected".to_string())),
            Err(_) => Err(LocationError::Timeout),
        }
    }

    fn watch_position(&self, options: PositionOptions) -> PositionStream {
        if !self.supported {
            return futures::stream::once(async { Err(LocationError::Unsupported) }).boxed();
        }
        let (id, mut rx) = self.register();
        // Owned by the stream from the start, so an unpolled stream still clears.
        let guard = RequestGuard {
            id,
            requests: self.requests.clone(),
            clear_on: Some(self.outbound.clone()),
        };

        if self.outbound.send(OutboundMessage::WatchPosition { id, options }).is_err() {
            return futures::stream::once(async move {
                drop(guard);
                Err(LocationError::Unknown("device disconnected".to_string()))
            }).boxed();
        }

        Box::pin(async_stream::stream! {
            let _guard = guard;
            while let Some(reply) = rx.recv().await {
                yield reply;
            }
        })
    }
}
