//! Request store - the remote collection the engine synchronizes against.
//!
//! The store owns persistence, joins and the change feed. The engine only
//! needs equality-filtered, newest-first queries, three writes, and a
//! subscribe/unsubscribe pair.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               RequestEngine                  │
//! │  query() on fetch, create/update/delete on   │
//! │  explicit actions, one change subscription   │
//! └──────────────────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────┐
//! │             RequestStore trait               │
//! └──────────────────────────────────────────────┘
//!          │                         │
//!          ▼                         ▼
//! ┌────────────────────┐   ┌─────────────────────┐
//! │InMemoryRequestStore│   │ hosted backend      │
//! │    (included)      │   │   (external)        │
//! └────────────────────┘   └─────────────────────┘
//! ```

mod change;
mod error;
mod in_memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::RequestFilter;
use crate::request::{NewRequest, Request, RequestPatch, RequestStatus, UserId};

pub use change::{ChangeEvent, ChangeKind, ChangeSubscription, SubscriptionId};
pub use error::StoreError;
pub use in_memory::InMemoryRequestStore;

/// Collection name of the request table and its change feed.
pub const REQUESTS_COLLECTION: &str = "requests";

/// Server-side constraints for a request query.
///
/// Results are always joined with owner and category and ordered by
/// creation time, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreQuery {
    pub status: Option<RequestStatus>,
    pub category_id: Option<String>,
    /// `user_id = owner_id`
    pub owner_id: Option<UserId>,
    /// `user_id <> exclude_owner_id`
    pub exclude_owner_id: Option<UserId>,
}

impl StoreQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The equality half of a `RequestFilter`.
    pub fn from_filter(filter: &RequestFilter) -> Self {
        Self {
            status: filter.status,
            category_id: filter.category_id.clone(),
            owner_id: filter.user_id.clone(),
            exclude_owner_id: None,
        }
    }

    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn owned_by(mut self, user_id: impl Into<UserId>) -> Self {
        self.owner_id = Some(user_id.into());
        self
    }

    pub fn not_owned_by(mut self, user_id: impl Into<UserId>) -> Self {
        self.exclude_owner_id = Some(user_id.into());
        self
    }

    /// Whether a request satisfies every constraint.
    pub fn matches(&self, request: &Request) -> bool {
        self.status.map_or(true, |s| request.status == s)
            && self
                .category_id
                .as_deref()
                .map_or(true, |c| request.category_id == c)
            && self
                .owner_id
                .as_deref()
                .map_or(true, |o| request.user_id == o)
            && self
                .exclude_owner_id
                .as_deref()
                .map_or(true, |o| request.user_id != o)
    }
}

/// Abstract remote request collection.
///
/// Every method is a suspension point; implementations talk to the network.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Query requests joined with owner and category, newest first.
    async fn query(&self, query: &StoreQuery) -> Result<Vec<Request>, StoreError>;

    /// Insert a request owned by `owner_id`. The store assigns id,
    /// creation time and the `open` status, and returns the joined row.
    async fn create(&self, owner_id: &str, fields: NewRequest) -> Result<Request, StoreError>;

    /// Apply a partial update and return the joined row.
    async fn update(&self, id: &str, patch: RequestPatch) -> Result<Request, StoreError>;

    /// Delete a request. Returns true if it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Open a change feed on `collection`. Events flow until `unsubscribe`.
    async fn subscribe_to_changes(&self, collection: &str) -> Result<ChangeSubscription, StoreError>;

    /// Close a change feed opened by `subscribe_to_changes`.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError>;
}
