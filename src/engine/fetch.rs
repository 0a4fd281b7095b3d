//! Fetch orchestration: store query, client-side filters, guarded write.

use tracing::{debug, warn};

use super::state::{EngineState, FetchOutcome, FetchTicket, ViewKind};
use super::{EngineError, RequestEngine};
use crate::filter::{apply_filters, apply_radius, apply_search, RadiusFilter, RequestFilter};
use crate::geo::Coordinates;
use crate::location::LocationProvider;
use crate::request::{Request, RequestStatus, UserId};
use crate::store::StoreQuery;

impl RequestEngine {
    /// Start a fetch for `view`: returns its ticket and the user it runs as,
    /// or `None` when there is no user or the engine is torn down.
    fn issue(
        &self,
        view: ViewKind,
        prepare: impl FnOnce(&mut EngineState),
    ) -> Option<(FetchTicket, UserId)> {
        let mut state = self.lock();
        if state.is_torn_down() {
            return None;
        }
        let user = state.user.clone()?;

        prepare(&mut state);
        let seq = state.slot_mut(view).issue();
        Some((
            FetchTicket {
                view,
                epoch: state.epoch,
                seq,
            },
            user,
        ))
    }

    /// Replace the view if the ticket is still current.
    fn commit(&self, ticket: FetchTicket, items: Vec<Request>) -> FetchOutcome {
        let len = items.len();
        {
            let mut state = self.lock();
            if !state.accepts(ticket.epoch) {
                debug!(view = ticket.view.as_str(), "session ended; discarding fetch result");
                return FetchOutcome::Discarded;
            }
            let slot = state.slot_mut(ticket.view);
            if !slot.is_latest(ticket.seq) {
                debug!(view = ticket.view.as_str(), seq = ticket.seq, "newer fetch in flight; dropping result");
                return FetchOutcome::Superseded;
            }
            slot.replace(items);
        }

        debug!(view = ticket.view.as_str(), len, "view replaced");
        self.emit_change(ticket.view, len);
        FetchOutcome::Applied { len }
    }

    /// Record a failed fetch. The view is left untouched.
    fn fail(&self, ticket: FetchTicket, err: EngineError) -> FetchOutcome {
        let mut state = self.lock();
        if !state.accepts(ticket.epoch) {
            return FetchOutcome::Discarded;
        }
        warn!(view = ticket.view.as_str(), error = %err, "fetch failed; keeping previous view");
        state.error = Some(err.clone());
        FetchOutcome::Failed(err)
    }

    /// Record input that never reached the store.
    fn reject(&self, err: EngineError) -> FetchOutcome {
        let epoch = self.lock().epoch;
        warn!(error = %err, "fetch rejected");
        self.record_error(epoch, &err);
        FetchOutcome::Failed(err)
    }

    /// Populate `requests`.
    ///
    /// Equality filters go to the store; search text, self-exclusion and
    /// radius run client-side. Without an owner filter the current user's
    /// own requests are left out.
    pub async fn fetch_all(&self, filter: RequestFilter) -> FetchOutcome {
        if let Some(radius) = &filter.near {
            if let Err(err) = check_area(radius) {
                return self.reject(err);
            }
        }

        let issued = self.issue(ViewKind::Requests, |state| {
            state.error = None;
            state.last_filter = filter.clone();
        });
        let Some((ticket, user)) = issued else {
            debug!("no user; skipping requests fetch");
            return FetchOutcome::Skipped;
        };

        debug!(seq = ticket.seq, ?filter, "fetching requests");
        match self.store().query(&StoreQuery::from_filter(&filter)).await {
            Ok(rows) => self.commit(ticket, apply_filters(rows, &filter, &user)),
            Err(err) => self.fail(ticket, err.into()),
        }
    }

    /// Populate `my_requests` with everything the current user owns.
    pub async fn fetch_mine(&self) -> FetchOutcome {
        let Some((ticket, user)) = self.issue(ViewKind::MyRequests, |_| {}) else {
            return FetchOutcome::Skipped;
        };

        debug!(seq = ticket.seq, "fetching my requests");
        match self.store().query(&StoreQuery::new().owned_by(user)).await {
            Ok(rows) => self.commit(ticket, rows),
            Err(err) => self.fail(ticket, err.into()),
        }
    }

    /// Populate `nearby_requests`: other users' open requests within
    /// `radius_km` of the given point, nearest first.
    pub async fn fetch_nearby(&self, latitude: f64, longitude: f64, radius_km: f64) -> FetchOutcome {
        let radius = RadiusFilter {
            center: Coordinates::new(latitude, longitude),
            radius_km,
        };
        if let Err(err) = check_area(&radius) {
            return self.reject(err);
        }

        let issued = self.issue(ViewKind::Nearby, |state| {
            state.error = None;
            state.nearby_in_flight += 1;
        });
        let Some((ticket, user)) = issued else {
            return FetchOutcome::Skipped;
        };
        let _loading = NearbyLoading {
            engine: self,
            epoch: ticket.epoch,
        };

        debug!(seq = ticket.seq, latitude, longitude, radius_km, "fetching nearby requests");
        let query = StoreQuery::new()
            .status(RequestStatus::Open)
            .not_owned_by(user);
        match self.store().query(&query).await {
            Ok(rows) => self.commit(ticket, apply_radius(rows, &radius)),
            Err(err) => self.fail(ticket, err.into()),
        }
    }

    /// Read the device position and fetch nearby requests around it.
    ///
    /// `radius_km` falls back to the configured default. A location failure
    /// is recorded and returned.
    pub async fn fetch_nearby_from(
        &self,
        location: &dyn LocationProvider,
        radius_km: Option<f64>,
    ) -> Result<FetchOutcome, EngineError> {
        let epoch = {
            let state = self.lock();
            if state.is_torn_down() || state.user.is_none() {
                return Ok(FetchOutcome::Skipped);
            }
            state.epoch
        };

        let position = match location.current_position().await {
            Ok(position) => position,
            Err(err) => {
                let err = EngineError::from(err);
                warn!(error = %err, "cannot read device position");
                self.record_error(epoch, &err);
                return Err(err);
            }
        };

        let radius_km = radius_km.unwrap_or_else(|| self.config().default_radius_km());
        Ok(self
            .fetch_nearby(position.latitude, position.longitude, radius_km)
            .await)
    }

    /// Ad hoc search. Does not touch any view.
    ///
    /// `query` is matched case-insensitively against title, location label
    /// and category name, and takes the place of `filter.search`. Status,
    /// category and owner go to the store; a radius in the filter is
    /// applied client-side. Returns an empty list when nobody is signed in.
    pub async fn search(&self, query: &str, filter: RequestFilter) -> Result<Vec<Request>, EngineError> {
        let epoch = {
            let state = self.lock();
            if state.is_torn_down() {
                return Err(EngineError::TornDown);
            }
            if state.user.is_none() {
                return Ok(Vec::new());
            }
            state.epoch
        };

        let rows = match self.store().query(&StoreQuery::from_filter(&filter)).await {
            Ok(rows) => rows,
            Err(err) => {
                let err = EngineError::from(err);
                warn!(error = %err, query, "search failed");
                self.record_error(epoch, &err);
                return Err(err);
            }
        };

        let found = apply_search(rows, query);
        Ok(match &filter.near {
            Some(radius) => apply_radius(found, radius),
            None => found,
        })
    }
}

/// Counts one nearby fetch as in flight until dropped, including when the
/// caller stops polling it. A bumped epoch has already reset the count.
struct NearbyLoading<'a> {
    engine: &'a RequestEngine,
    epoch: u64,
}

impl Drop for NearbyLoading<'_> {
    fn drop(&mut self) {
        let mut state = self.engine.lock();
        if state.epoch == self.epoch {
            state.nearby_in_flight = state.nearby_in_flight.saturating_sub(1);
        }
    }
}

fn check_area(radius: &RadiusFilter) -> Result<(), EngineError> {
    let center = radius.center;
    if !center.is_valid() {
        return Err(EngineError::InvalidInput(format!(
            "coordinates out of range: ({}, {})",
            center.latitude, center.longitude
        )));
    }
    if !radius.radius_km.is_finite() || radius.radius_km < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "radius must be a non-negative number of km, got {}",
            radius.radius_km
        )));
    }
    Ok(())
}
