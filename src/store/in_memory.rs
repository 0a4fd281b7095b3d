//! InMemoryRequestStore - HashMap-backed request store for testing and development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    ChangeEvent, ChangeKind, ChangeSubscription, RequestStore, StoreError, StoreQuery,
    SubscriptionId, REQUESTS_COLLECTION,
};
use crate::request::{
    CategorySummary, NewRequest, Request, RequestPatch, RequestStatus, UserSummary,
};

/// Internal stored representation of a request, without joins.
#[derive(Clone)]
struct Row {
    id: String,
    title: String,
    description: String,
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    status: RequestStatus,
    created_at: DateTime<Utc>,
    user_id: String,
    category_id: String,
    /// Insertion order, breaks ties between equal timestamps.
    seq: u64,
}

#[derive(Default)]
struct Tables {
    requests: HashMap<String, Row>,
    /// user id -> display name
    users: HashMap<String, Option<String>>,
    /// category id -> name
    categories: HashMap<String, String>,
    next_seq: u64,
}

/// Injected failures and latency.
#[derive(Default, Clone)]
struct Faults {
    query: Option<String>,
    write: Option<String>,
    subscribe: Option<String>,
    query_delay: Option<Duration>,
}

struct Feed {
    collection: String,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    feeds: Mutex<HashMap<SubscriptionId, Feed>>,
    faults: Mutex<Faults>,
    next_subscription: AtomicU64,
    queries_started: AtomicUsize,
}

/// In-memory request store with users, categories and a change feed.
///
/// Features:
/// - Clone-friendly via Arc; clones share the same tables
/// - Joins owner and category at query time, like a hosted backend would
/// - Every write fans out a `ChangeEvent` to each open subscription
/// - Failure and latency injection for exercising the engine's error paths
///
/// ## Example
///
/// ```
/// use neighbor_sync::store::{InMemoryRequestStore, StoreQuery, RequestStore};
/// use neighbor_sync::NewRequest;
///
/// # tokio_test_block(async {
/// let store = InMemoryRequestStore::new();
/// store.add_user("u1", Some("Ada"));
/// store.add_category("plumbing", "Plumbing");
///
/// store.create("u1", NewRequest::new("Fix sink", "Leaky", "Downtown", "plumbing")).await.unwrap();
///
/// let rows = store.query(&StoreQuery::new().owned_by("u1")).await.unwrap();
/// assert_eq!(rows[0].category.name, "Plumbing");
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    shared: Arc<Shared>,
}

impl InMemoryRequestStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.shared
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn write_tables(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.shared
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.shared
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn feeds(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Feed>> {
        self.shared
            .feeds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ---------------------------------------------------------------------
    // Fixtures
    // ---------------------------------------------------------------------

    /// Register (or rename) a user profile.
    pub fn add_user(&self, id: impl Into<String>, full_name: Option<&str>) {
        if let Ok(mut tables) = self.write_tables() {
            tables.users.insert(id.into(), full_name.map(str::to_string));
        }
    }

    /// Remove a user profile. Their requests stay, with a null owner join.
    pub fn remove_user(&self, id: &str) {
        if let Ok(mut tables) = self.write_tables() {
            tables.users.remove(id);
        }
    }

    pub fn add_category(&self, id: impl Into<String>, name: impl Into<String>) {
        if let Ok(mut tables) = self.write_tables() {
            tables.categories.insert(id.into(), name.into());
        }
    }

    /// Number of stored requests.
    pub fn len(&self) -> usize {
        self.read_tables().map(|t| t.requests.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// Make every query fail with `message` (or succeed again with `None`).
    pub fn set_query_failure(&self, message: Option<&str>) {
        self.faults().query = message.map(str::to_string);
    }

    /// Make create/update/delete fail with `message`.
    pub fn set_write_failure(&self, message: Option<&str>) {
        self.faults().write = message.map(str::to_string);
    }

    /// Make `subscribe_to_changes` fail with `message`.
    pub fn set_subscribe_failure(&self, message: Option<&str>) {
        self.faults().subscribe = message.map(str::to_string);
    }

    /// Delay every query started from now on. Rows are read before the
    /// delay, so a slow query returns what the table held when it started.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        self.faults().query_delay = delay;
    }

    /// Drop every open change feed, as a lost realtime connection would.
    pub fn close_change_feeds(&self) {
        self.feeds().clear();
    }

    /// Number of open change feeds.
    pub fn subscriber_count(&self) -> usize {
        self.feeds().len()
    }

    /// Number of queries started since creation.
    pub fn queries_started(&self) -> usize {
        self.shared.queries_started.load(Ordering::SeqCst)
    }

    // ---------------------------------------------------------------------
    // Synchronous core
    // ---------------------------------------------------------------------

    fn join(tables: &Tables, row: &Row) -> Request {
        let user = tables.users.get(&row.user_id).map(|full_name| UserSummary {
            id: row.user_id.clone(),
            full_name: full_name.clone(),
        });
        let category = CategorySummary {
            id: row.category_id.clone(),
            name: tables
                .categories
                .get(&row.category_id)
                .cloned()
                .unwrap_or_default(),
        };

        Request {
            id: row.id.clone(),
            title: row.title.clone(),
            description: row.description.clone(),
            location: row.location.clone(),
            latitude: row.latitude,
            longitude: row.longitude,
            status: row.status,
            created_at: row.created_at,
            user_id: row.user_id.clone(),
            category_id: row.category_id.clone(),
            user,
            category,
            distance_km: None,
        }
    }

    fn select(&self, query: &StoreQuery) -> Result<Vec<Request>, StoreError> {
        let tables = self.read_tables()?;

        let mut rows: Vec<&Row> = tables.requests.values().collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        Ok(rows
            .into_iter()
            .map(|row| Self::join(&tables, row))
            .filter(|request| query.matches(request))
            .collect())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        match &self.faults().write {
            Some(message) => Err(StoreError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    /// Insert a request synchronously and notify subscribers.
    pub fn insert(&self, owner_id: &str, fields: NewRequest) -> Result<Request, StoreError> {
        self.check_write()?;

        if fields.title.trim().is_empty() {
            return Err(StoreError::Rejected("title must not be empty".into()));
        }

        let request = {
            let mut tables = self.write_tables()?;
            if !tables.categories.contains_key(&fields.category_id) {
                return Err(StoreError::Rejected(format!(
                    "unknown category: {}",
                    fields.category_id
                )));
            }

            tables.next_seq += 1;
            let row = Row {
                id: Uuid::new_v4().to_string(),
                title: fields.title,
                description: fields.description,
                location: fields.location,
                latitude: fields.latitude,
                longitude: fields.longitude,
                status: RequestStatus::Open,
                created_at: Utc::now(),
                user_id: owner_id.to_string(),
                category_id: fields.category_id,
                seq: tables.next_seq,
            };
            let request = Self::join(&tables, &row);
            tables.requests.insert(row.id.clone(), row);
            request
        };

        self.notify(ChangeKind::Inserted, &request.id);
        Ok(request)
    }

    fn apply_patch(&self, id: &str, patch: RequestPatch) -> Result<Request, StoreError> {
        self.check_write()?;

        let request = {
            let mut tables = self.write_tables()?;
            if let Some(category_id) = &patch.category_id {
                if !tables.categories.contains_key(category_id) {
                    return Err(StoreError::Rejected(format!(
                        "unknown category: {}",
                        category_id
                    )));
                }
            }

            let row = tables
                .requests
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound {
                    collection: REQUESTS_COLLECTION.to_string(),
                    id: id.to_string(),
                })?;

            if let Some(title) = patch.title {
                row.title = title;
            }
            if let Some(description) = patch.description {
                row.description = description;
            }
            if let Some(location) = patch.location {
                row.location = location;
            }
            if let Some(latitude) = patch.latitude {
                row.latitude = Some(latitude);
            }
            if let Some(longitude) = patch.longitude {
                row.longitude = Some(longitude);
            }
            if let Some(status) = patch.status {
                row.status = status;
            }
            if let Some(category_id) = patch.category_id {
                row.category_id = category_id;
            }

            let row = row.clone();
            Self::join(&tables, &row)
        };

        self.notify(ChangeKind::Updated, id);
        Ok(request)
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.check_write()?;

        let existed = self.write_tables()?.requests.remove(id).is_some();
        if existed {
            self.notify(ChangeKind::Deleted, id);
        }
        Ok(existed)
    }

    /// Fan a change out to every feed on the request collection, dropping
    /// feeds whose receiver is gone.
    fn notify(&self, kind: ChangeKind, record_id: &str) {
        let event = ChangeEvent::new(kind, REQUESTS_COLLECTION, record_id);
        self.feeds().retain(|_, feed| {
            feed.collection != event.collection || feed.sender.send(event.clone()).is_ok()
        });
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn query(&self, query: &StoreQuery) -> Result<Vec<Request>, StoreError> {
        self.shared.queries_started.fetch_add(1, Ordering::SeqCst);
        let faults = self.faults().clone();

        let rows = match &faults.query {
            Some(_) => Vec::new(),
            None => self.select(query)?,
        };

        if let Some(delay) = faults.query_delay {
            tokio::time::sleep(delay).await;
        }

        match faults.query {
            Some(message) => Err(StoreError::Unavailable(message)),
            None => Ok(rows),
        }
    }

    async fn create(&self, owner_id: &str, fields: NewRequest) -> Result<Request, StoreError> {
        self.insert(owner_id, fields)
    }

    async fn update(&self, id: &str, patch: RequestPatch) -> Result<Request, StoreError> {
        self.apply_patch(id, patch)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(id)
    }

    async fn subscribe_to_changes(&self, collection: &str) -> Result<ChangeSubscription, StoreError> {
        if let Some(message) = self.faults().subscribe.clone() {
            return Err(StoreError::Subscription(message));
        }

        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        let (sender, events) = mpsc::unbounded_channel();
        self.feeds().insert(
            id,
            Feed {
                collection: collection.to_string(),
                sender,
            },
        );

        Ok(ChangeSubscription { id, events })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        self.feeds().remove(&id);
        Ok(())
    }
}
