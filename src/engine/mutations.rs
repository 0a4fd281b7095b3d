//! Explicit user actions: create, update, delete.
//!
//! These never patch a view locally. The change feed (or the next refresh)
//! brings the views up to date. Failures are recorded in the error slot and
//! returned to the caller.

use tracing::{info, warn};

use super::{EngineError, RequestEngine};
use crate::request::{NewRequest, Request, RequestPatch, UserId};

impl RequestEngine {
    /// Epoch of a live engine, or `TornDown`.
    fn live_epoch(&self) -> Result<u64, EngineError> {
        let state = self.lock();
        if state.is_torn_down() {
            return Err(EngineError::TornDown);
        }
        Ok(state.epoch)
    }

    fn signed_in(&self) -> Result<(UserId, u64), EngineError> {
        let mut state = self.lock();
        if state.is_torn_down() {
            return Err(EngineError::TornDown);
        }
        match state.user.clone() {
            Some(user) => Ok((user, state.epoch)),
            None => {
                state.error = Some(EngineError::NotAuthenticated);
                Err(EngineError::NotAuthenticated)
            }
        }
    }

    fn rejected(&self, epoch: u64, action: &'static str, err: EngineError) -> EngineError {
        warn!(action, error = %err, "request mutation failed");
        self.record_error(epoch, &err);
        err
    }

    /// Create a request owned by the current user. Returns the stored,
    /// joined record.
    pub async fn create_request(&self, fields: NewRequest) -> Result<Request, EngineError> {
        let (user, epoch) = self.signed_in()?;

        match self.store().create(&user, fields).await {
            Ok(request) => {
                info!(id = %request.id, "request created");
                Ok(request)
            }
            Err(err) => Err(self.rejected(epoch, "create", err.into())),
        }
    }

    pub async fn update_request(&self, id: &str, patch: RequestPatch) -> Result<Request, EngineError> {
        let epoch = self.live_epoch()?;

        match self.store().update(id, patch).await {
            Ok(request) => {
                info!(id, status = %request.status, "request updated");
                Ok(request)
            }
            Err(err) => Err(self.rejected(epoch, "update", err.into())),
        }
    }

    /// Delete a request. `Ok(false)` when it was already gone.
    pub async fn delete_request(&self, id: &str) -> Result<bool, EngineError> {
        let epoch = self.live_epoch()?;

        match self.store().delete(id).await {
            Ok(existed) => {
                info!(id, existed, "request deleted");
                Ok(existed)
            }
            Err(err) => Err(self.rejected(epoch, "delete", err.into())),
        }
    }
}
