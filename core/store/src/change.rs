//! Change notifications for items and key material.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::item::ContentType;
use keyvault_common::{ItemId, KeySystemIdentifier};

/// Default capacity of the change channel.
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Changed,
    Removed,
}

/// A single committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    pub content_type: ContentType,
    pub kind: ChangeKind,
    /// Absent for key material that is not addressed by item id.
    pub uuid: Option<ItemId>,
    pub key_system_identifier: Option<KeySystemIdentifier>,
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Change(ItemChange),
    /// The subscriber fell behind and this many changes were dropped.
    Missed(u64),
}

/// Publishing side of the change feed.
///
/// Cloned into every component that commits mutations so all of them
/// announce on the same channel.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ItemChange>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Announce a change. Having no subscribers is not an error.
    pub fn publish(&self, change: ItemChange) {
        let _ = self.tx.send(change);
    }

    /// Subscribe to changes of the given content types.
    pub fn subscribe(&self, content_types: &[ContentType]) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            content_types: content_types.to_vec(),
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_CAPACITY)
    }
}

/// Receiving side of the change feed, filtered by content type.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ItemChange>,
    content_types: Vec<ContentType>,
}

impl ChangeSubscription {
    /// Wait for the next relevant notification.
    ///
    /// Returns `None` once every notifier has been dropped.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.content_types.contains(&change.content_type) => {
                    return Some(Notification::Change(change));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => return Some(Notification::Missed(missed)),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn content_types(&self) -> &[ContentType] {
        &self.content_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(content_type: ContentType) -> ItemChange {
        ItemChange {
            content_type,
            kind: ChangeKind::Changed,
            uuid: None,
            key_system_identifier: None,
        }
    }

    #[tokio::test]
    async fn test_subscription_filters_content_types() {
        let notifier = ChangeNotifier::default();
        let mut subscription = notifier.subscribe(&[ContentType::KeySystemItemsKey]);

        notifier.publish(change(ContentType::Note));
        notifier.publish(change(ContentType::KeySystemItemsKey));

        let received = subscription.recv().await.unwrap();
        assert_eq!(
            received,
            Notification::Change(change(ContentType::KeySystemItemsKey))
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber_is_told() {
        let notifier = ChangeNotifier::new(2);
        let mut subscription = notifier.subscribe(&[ContentType::Note]);

        for _ in 0..5 {
            notifier.publish(change(ContentType::Note));
        }

        assert!(matches!(
            subscription.recv().await,
            Some(Notification::Missed(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_when_notifier_dropped() {
        let notifier = ChangeNotifier::default();
        let mut subscription = notifier.subscribe(&[ContentType::Note]);
        drop(notifier);

        assert!(subscription.recv().await.is_none());
    }
}
