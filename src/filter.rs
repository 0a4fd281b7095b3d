//! Filter options and the pure client-side filters applied after a
//! store query.
//!
//! The store handles equality constraints (status, category, owner). Search
//! text, self-exclusion and radius containment depend on who is asking and
//! where they are, so they run here, in this order:
//!
//! 1. case-insensitive substring match on title, location and category name
//! 2. drop the caller's own requests unless an owner filter was given
//! 3. radius: drop rows without coordinates, attach `distance_km`, drop rows
//!    beyond the radius, sort nearest first

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geo::Coordinates;
use crate::request::{Request, RequestStatus, UserId};

/// A reference point and a radius around it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusFilter {
    pub center: Coordinates,
    pub radius_km: f64,
}

impl RadiusFilter {
    pub fn new(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        Self {
            center: Coordinates::new(latitude, longitude),
            radius_km,
        }
    }
}

/// Optional constraints for a fetch or a search. Built fresh per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestFilter {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Explicit owner. When set, the caller's own requests are not excluded.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub near: Option<RadiusFilter>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_owner(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn within(mut self, latitude: f64, longitude: f64, radius_km: f64) -> Self {
        self.near = Some(RadiusFilter::new(latitude, longitude, radius_km));
        self
    }
}

fn search_needle(search: Option<&str>) -> Option<String> {
    search.filter(|s| !s.is_empty()).map(str::to_lowercase)
}

/// Whether `needle` (already lowercased) occurs in the title, location label
/// or category name.
pub fn matches_search(request: &Request, needle: &str) -> bool {
    request.title.to_lowercase().contains(needle)
        || request.location.to_lowercase().contains(needle)
        || request.category.name.to_lowercase().contains(needle)
}

/// Keep requests matching `query`. An empty query keeps everything.
pub fn apply_search(requests: Vec<Request>, query: &str) -> Vec<Request> {
    match search_needle(Some(query)) {
        Some(needle) => requests
            .into_iter()
            .filter(|r| matches_search(r, &needle))
            .collect(),
        None => requests,
    }
}

pub fn exclude_owner(requests: Vec<Request>, user_id: &str) -> Vec<Request> {
    requests
        .into_iter()
        .filter(|r| !r.is_owned_by(user_id))
        .collect()
}

/// Radius containment with distance annotation, nearest first.
///
/// The sort is stable, so equidistant requests keep their incoming
/// (newest-first) order.
pub fn apply_radius(requests: Vec<Request>, radius: &RadiusFilter) -> Vec<Request> {
    let mut within: Vec<Request> = requests
        .into_iter()
        .filter_map(|mut request| {
            let distance = radius.center.distance_km(&request.coordinates()?);
            if distance <= radius.radius_km {
                request.distance_km = Some(distance);
                Some(request)
            } else {
                None
            }
        })
        .collect();

    within.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });
    within
}

/// Client-side half of a `requests` fetch: search, self-exclusion, radius.
pub fn apply_filters(requests: Vec<Request>, filter: &RequestFilter, current_user: &str) -> Vec<Request> {
    let mut requests = apply_search(requests, filter.search.as_deref().unwrap_or_default());

    if filter.user_id.is_none() {
        requests = exclude_owner(requests, current_user);
    }

    match &filter.near {
        Some(radius) => apply_radius(requests, radius),
        None => requests,
    }
}
