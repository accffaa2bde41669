//! Account Profile
//!
//! After sign-up the client records a `users/{uid}` profile. Authentication
//! has already succeeded at that point, so a failed write is logged and
//! reported as deferred rather than failing the sign-up.

use crate::domain::{OwnerId, StoreError};
use crate::repository::ProfileStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOutcome {
    Recorded,
    Deferred(StoreError),
}

impl ProfileOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, ProfileOutcome::Recorded)
    }
}

pub async fn record_profile<S: ProfileStore + ?Sized>(store: &S, owner: &OwnerId, email: &str) -> ProfileOutcome {
    match store.write_profile(owner, email).await {
        Ok(()) => {
            tracing::info!("recorded profile for {}", owner);
            ProfileOutcome::Recorded
        }
        Err(cause) => {
            tracing::warn!("profile write for {} failed, continuing: {}", owner, cause);
            ProfileOutcome::Deferred(cause)
        }
    }
}
