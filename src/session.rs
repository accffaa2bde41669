//! Session
//!
//! Who is signed in. The core only ever asks for the current owner id;
//! authentication itself happens elsewhere.

use std::sync::{PoisonError, RwLock};

use crate::domain::OwnerId;

/// Source of the authenticated user id
pub trait Session: Send + Sync {
    /// `None` when nobody is signed in
    fn current_user_id(&self) -> Option<OwnerId>;
}

/// In-process session holder
#[derive(Debug, Default)]
pub struct SessionState {
    current: RwLock<Option<OwnerId>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(owner: impl Into<OwnerId>) -> Self {
        Self {
            current: RwLock::new(Some(owner.into())),
        }
    }

    pub fn sign_in(&self, owner: impl Into<OwnerId>) {
        let owner = owner.into();
        tracing::info!("signed in as {}", owner);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(owner);
    }

    pub fn sign_out(&self) {
        if let Some(owner) = self.current.write().unwrap_or_else(PoisonError::into_inner).take() {
            tracing::info!("signed out {}", owner);
        }
    }
}

impl Session for SessionState {
    fn current_user_id(&self) -> Option<OwnerId> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
