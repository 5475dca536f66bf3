// ── Event subscriptions ──
//
// Subscribers read from a bounded broadcast channel. The session never
// waits for them: a subscriber that falls more than `event_capacity`
// events behind loses the oldest ones and resumes with the rest, still in
// arrival order.

use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::model::DeviceEvent;

/// A lag-tolerant receiver of [`DeviceEvent`]s.
#[derive(Debug)]
pub struct DeviceSubscription {
    rx: broadcast::Receiver<DeviceEvent>,
    dropped: u64,
}

impl DeviceSubscription {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceEvent>) -> Self {
        Self { rx, dropped: 0 }
    }

    /// Next event, skipping over any this subscriber was too slow for.
    /// Returns `None` once the session is gone.
    pub async fn next(&mut self) -> Option<DeviceEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged, oldest events dropped");
                    self.dropped += skipped;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<DeviceEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.dropped += skipped,
                Err(_) => return None,
            }
        }
    }

    /// Total events this subscriber lost to lag.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Adapt into a `Stream`, dropping lag notifications.
    pub fn into_stream(self) -> impl Stream<Item = DeviceEvent> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|item| async move {
            match item {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged, oldest events dropped");
                    None
                }
            }
        })
    }
}

/// Keeps a callback subscription alive; dropping it stops the callback.
#[derive(Debug)]
pub struct CallbackHandle {
    task: JoinHandle<()>,
}

impl CallbackHandle {
    pub(crate) fn spawn<F>(mut subscription: DeviceSubscription, mut callback: F) -> Self
    where
        F: FnMut(DeviceEvent) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                callback(event);
            }
        });
        Self { task }
    }

    /// Stop delivering events.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::session::SessionState;

    fn state_event(state: SessionState) -> DeviceEvent {
        DeviceEvent::StateChanged(state)
    }

    fn state_of(event: &DeviceEvent) -> Option<SessionState> {
        match event {
            DeviceEvent::StateChanged(state) => Some(*state),
            _ => None,
        }
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = DeviceSubscription::new(rx);

        tx.send(state_event(SessionState::Connecting)).unwrap();
        tx.send(state_event(SessionState::AwaitingWake)).unwrap();
        tx.send(state_event(SessionState::Awake)).unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(state_of(&first), Some(SessionState::AwaitingWake));
        let second = sub.next().await.unwrap();
        assert_eq!(state_of(&second), Some(SessionState::Awake));
        assert_eq!(sub.dropped(), 1);
    }

    #[tokio::test]
    async fn closed_channel_ends_subscription() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = DeviceSubscription::new(rx);
        drop(tx);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_preserves_order() {
        let (tx, rx) = broadcast::channel(8);
        let stream = DeviceSubscription::new(rx).into_stream();
        tx.send(state_event(SessionState::Connecting)).unwrap();
        tx.send(state_event(SessionState::AwaitingWake)).unwrap();
        drop(tx);

        let states: Vec<_> = stream.map(|e| state_of(&e)).collect().await;
        assert_eq!(
            states,
            vec![Some(SessionState::Connecting), Some(SessionState::AwaitingWake)]
        );
    }

    #[tokio::test]
    async fn callback_receives_events_until_dropped() {
        let (tx, rx) = broadcast::channel(8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = CallbackHandle::spawn(DeviceSubscription::new(rx), move |event| {
            sink.lock().unwrap().push(state_of(&event));
        });

        tx.send(state_event(SessionState::Awake)).unwrap();
        tokio::task::yield_now().await;
        while seen.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        drop(handle);
        tokio::task::yield_now().await;

        assert_eq!(*seen.lock().unwrap(), vec![Some(SessionState::Awake)]);
    }
}
