use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

pub type SubscriberId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Process-wide publish/subscribe channel between the data layer and the
/// toast surface. Fan-out is synchronous and unbuffered: an event published
/// with no subscribers is simply not observed.
#[derive(Clone)]
pub struct NotificationBus {
    senders: Arc<DashMap<SubscriberId, mpsc::UnboundedSender<Notification>>>,
    visible: Arc<Mutex<VecDeque<(Instant, Notification)>>>,
    display_ttl: Duration,
}

impl NotificationBus {
    pub fn new(display_ttl: Duration) -> Self {
        Self {
            senders: Arc::new(DashMap::new()),
            visible: Arc::new(Mutex::new(VecDeque::new())),
            display_ttl,
        }
    }

    pub fn publish(&self, kind: NotificationKind, message: impl Into<String>) {
        let event = Notification {
            kind,
            message: message.into(),
        };

        if let Ok(mut visible) = self.visible.lock() {
            let now = Instant::now();
            visible.push_back((now, event.clone()));
            Self::prune(&mut visible, now, self.display_ttl);
        }

        let mut closed = Vec::new();
        for entry in self.senders.iter() {
            if entry.value().send(event.clone()).is_err() {
                closed.push(*entry.key());
            }
        }
        for id in closed {
            debug!(%id, "subscriber channel closed, cleaning up");
            self.senders.remove(&id);
        }
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationKind::Error, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationKind::Info, message);
    }

    /// Each subscriber sees every event published after it subscribes.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(id, tx);
        debug!(%id, "subscriber registered");
        Subscription {
            id,
            rx,
            senders: self.senders.clone(),
        }
    }

    /// Notifications still within their display window, oldest first.
    pub fn visible(&self) -> Vec<Notification> {
        let mut visible = match self.visible.lock() {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        Self::prune(&mut visible, Instant::now(), self.display_ttl);
        visible.iter().map(|(_, n)| n.clone()).collect()
    }

    fn prune(visible: &mut VecDeque<(Instant, Notification)>, now: Instant, ttl: Duration) {
        while let Some((published_at, _)) = visible.front() {
            if now.duration_since(*published_at) >= ttl {
                visible.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Handle for one subscriber. Dropping it (or calling
/// [`Subscription::unsubscribe`]) detaches the subscriber from the bus.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Notification>,
    senders: Arc<DashMap<SubscriberId, mpsc::UnboundedSender<Notification>>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.senders.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{NotificationBus, NotificationKind};

    fn bus() -> NotificationBus {
        NotificationBus::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn subscriber_sees_events_published_after_subscribing() {
        let bus = bus();
        bus.error("before");

        let mut sub = bus.subscribe();
        assert!(sub.try_recv().is_none());

        bus.error("after");
        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, NotificationKind::Error);
        assert_eq!(event.message, "after");
    }

    #[tokio::test]
    async fn all_subscribers_receive_every_event() {
        let bus = bus();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.info("hello");

        assert_eq!(a.recv().await.unwrap().message, "hello");
        assert_eq!(b.recv().await.unwrap().message, "hello");
    }

    #[tokio::test]
    async fn unsubscribed_handles_stop_receiving() {
        let bus = bus();
        let sub = bus.subscribe();
        let mut kept = bus.subscribe();

        sub.unsubscribe();
        bus.error("late");

        assert_eq!(kept.recv().await.unwrap().message, "late");
        assert!(kept.try_recv().is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = bus();
        bus.error("nobody listening");
        assert_eq!(bus.visible().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn visible_notifications_expire_after_display_ttl() {
        let bus = NotificationBus::new(Duration::from_secs(5));
        bus.error("toast");
        assert_eq!(bus.visible().len(), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        bus.info("second toast");
        assert_eq!(bus.visible().len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let visible = bus.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].message, "second toast");

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(bus.visible().is_empty());
    }
}
