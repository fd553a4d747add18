//! Stream adapters for channel-fed fetchers.

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

/// Turn a channel receiver into a boxed stream that ends when every sender
/// has been dropped.
pub fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((item, rx))
    })
    .boxed()
}
