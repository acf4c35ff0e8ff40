//! Stream-based interface on top of a [`Session`](crate::Session).
#![allow(clippy::module_name_repetitions)]

use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::stream::StreamExt;
use log::error;
use tokio1 as tokio;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{WatchError, WatchId};
use crate::event::{Notification, WatchEvent};
use crate::options::WatchOptions;
use crate::session::Session;

const CHANNEL_CAPACITY: usize = 1024;

/// A stream of [`Notification`]s for one watch.
///
/// Ends once the watch is removed and every queued notification has been consumed. When the
/// consumer falls more than a channel's worth behind, further notifications are dropped and
/// logged.
pub struct NotificationStream {
    stream: ReceiverStream<Notification>,
}

impl Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.stream.poll_next_unpin(cx)
    }
}

impl Session {
    /// Watch `path` and receive its changes as a stream instead of through callbacks.
    ///
    /// # Errors
    /// Same as [`Session::add_watch`].
    pub fn add_watch_stream(
        &mut self,
        path: impl AsRef<Path>,
        recursive: bool,
    ) -> Result<(WatchId, NotificationStream), WatchError> {
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);
        let event_tx = Arc::new(event_tx);
        let error_tx = event_tx.clone();

        let options = WatchOptions::new()
            .recursive(recursive)
            .on_any(move |ev: &WatchEvent<'_>| {
                if let Err(e) = event_tx.try_send(Notification::from_event(ev)) {
                    error!("Unable to send notification from callback: {}", e);
                }
                Ok(())
            })
            .on_error(move |failure| {
                let error = anyhow::anyhow!("{:#}", failure.error);
                let notification = Notification::from_failure(failure, error);
                if let Err(e) = error_tx.try_send(notification) {
                    error!("Unable to send error notification from callback: {}", e);
                }
                Ok(())
            });

        let id = self.add_watch(path, options)?;
        Ok((
            id,
            NotificationStream {
                stream: ReceiverStream::new(event_rx),
            },
        ))
    }
}
