// ============================================================================
// Change Notifications
// ============================================================================
//
// The store keeps a registry of subscriber handles. Each subscriber owns the
// receiving half of an unbounded channel; broadcasting is a synchronous send
// on the owning thread, so delivery order is exactly mutation order.
//
// ============================================================================

use crate::core::{FieldRef, ObjectId};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};
use tracing::debug;

/// Low-level mutation event: `object.field` changed at `range_start`,
/// with `inserted` new and `deleted` removed vector elements.
/// Scalar property edits report `0/0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropChange {
    pub object: ObjectId,
    pub field: FieldRef,
    pub range_start: usize,
    pub inserted: usize,
    pub deleted: usize,
}

impl PropChange {
    pub fn new(
        object: ObjectId,
        field: impl Into<FieldRef>,
        range_start: usize,
        inserted: usize,
        deleted: usize,
    ) -> Self {
        Self {
            object,
            field: field.into(),
            range_start,
            inserted,
            deleted,
        }
    }

    /// A scalar edit that adds or removes nothing
    pub fn scalar(object: ObjectId, field: impl Into<FieldRef>) -> Self {
        Self::new(object, field, 0, 0, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Receiving end handed to a subscriber. Dropping it unregisters lazily.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: UnboundedReceiver<PropChange>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next queued change, if any, without blocking
    pub fn try_next(&mut self) -> Option<PropChange> {
        match self.receiver.try_recv() {
            Ok(change) => Some(change),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drains every queued change in arrival order
    pub fn drain(&mut self) -> Vec<PropChange> {
        let mut changes = Vec::new();
        while let Some(change) = self.try_next() {
            changes.push(change);
        }
        changes
    }
}

/// Registry of subscriber handles
#[derive(Debug, Default)]
pub struct NotificationHub {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriberId, UnboundedSender<PropChange>)>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = unbounded_channel();
        self.lock().push((id, sender));
        debug!(subscriber = id.0, "subscribed to change notifications");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.lock().retain(|(candidate, _)| *candidate != id);
        debug!(subscriber = id.0, "unsubscribed from change notifications");
    }

    /// Delivers `change` to every live subscriber, pruning closed handles
    pub fn broadcast(&self, change: PropChange) {
        let mut subscribers = self.lock();
        subscribers.retain(|(_, sender)| sender.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|(_, sender)| !sender.is_closed());
        subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriberId, UnboundedSender<PropChange>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
