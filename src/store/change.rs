//! Change-feed messages.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// A push notification from the store's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    /// Id of the row that changed.
    pub record_id: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, collection: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            kind,
            collection: collection.into(),
            record_id: record_id.into(),
        }
    }
}

/// Opaque token identifying an open change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An open change feed: its id and the receiving end of its events.
///
/// The channel closes when the store drops the sending side (unsubscribe,
/// connection loss).
pub struct ChangeSubscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
