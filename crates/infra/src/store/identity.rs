use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use reimburse_core::UserId;

use crate::error::StoreError;

/// The signed-in user as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub display_name: Option<String>,
}

/// Identity collaborator.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Result<Option<CurrentUser>, StoreError>;

    /// Last cached session record, if the transport keeps one.
    fn cached_session(&self) -> Option<JsonValue> {
        None
    }
}

/// Fixed identity for tests/dev.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    pub user: Option<CurrentUser>,
    pub session: Option<JsonValue>,
    pub unavailable: bool,
}

impl StaticIdentity {
    pub fn signed_in(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user: Some(CurrentUser {
                id,
                display_name: Some(display_name.into()),
            }),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session: JsonValue) -> Self {
        self.session = Some(session);
        self
    }

    /// Simulate the identity service being down.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Result<Option<CurrentUser>, StoreError> {
        if self.unavailable {
            return Err(StoreError::backend("identity service unavailable"));
        }
        Ok(self.user.clone())
    }

    fn cached_session(&self) -> Option<JsonValue> {
        self.session.clone()
    }
}
