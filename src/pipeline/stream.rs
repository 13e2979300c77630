//! Streaming backpressure via bounded channels.
//!
//! A producer task feeds query events into a bounded `mpsc` channel, so
//! it waits whenever the consumer falls behind. When the consumer drops
//! the stream, the producer future is dropped too, cancelling whatever it
//! was awaiting (typically the generation backend).

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::Result;
use crate::types::QueryEvent;

/// Stream of events from [`query_stream`](super::RetrievalOrchestrator::query_stream).
pub type QueryStream = Pin<Box<dyn Stream<Item = Result<QueryEvent>> + Send>>;

/// Sending half handed to the producer.
pub(crate) struct EventSender {
    tx: mpsc::Sender<Result<QueryEvent>>,
}

impl EventSender {
    /// Send one item, waiting for buffer space. Returns `false` once the
    /// consumer is gone.
    pub(crate) async fn send(&self, item: Result<QueryEvent>) -> bool {
        self.tx.send(item).await.is_ok()
    }
}

/// Run `produce` on a new task, exposing what it sends as a stream.
///
/// # Panics
///
/// Requires a tokio runtime context.
pub(crate) fn bounded_stream<F, Fut>(buffer_size: usize, produce: F) -> QueryStream
where
    F: FnOnce(EventSender) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer_size);
    let watcher = tx.clone();
    let producer = produce(EventSender { tx });

    tokio::spawn(async move {
        tokio::select! {
            _ = watcher.closed() => debug!("query stream dropped by consumer"),
            _ = producer => {}
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
