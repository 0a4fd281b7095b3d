//! Identity provider - "who is signed in, if anyone", plus a change stream.

use std::sync::Arc;

use tokio::sync::watch;

use crate::request::UserId;

/// Source of the current user identity.
///
/// The engine never authenticates anyone; it only reacts to the identity
/// appearing, changing and disappearing.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None`.
    fn current_user(&self) -> Option<UserId>;

    /// A receiver that observes every change to the current user.
    fn watch(&self) -> watch::Receiver<Option<UserId>>;
}

/// Identity backed by a `watch` channel. Sign-in and sign-out push to every
/// watcher.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    sender: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIdentity {
    /// Signed out.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn signed_in(user_id: impl Into<UserId>) -> Self {
        let identity = Self::new();
        identity.sign_in(user_id);
        identity
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) {
        self.sender.send_replace(Some(user_id.into()));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }
}
