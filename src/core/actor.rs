//! Authentication context supplied by the transport layer.
//!
//! The pipeline only authorizes: it trusts the `(user_id, is_admin)` pair it is handed
//! and compares it against record ownership.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};

/// The identity an operation runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Authenticated user id, `None` for anonymous callers
    pub user_id: Option<i64>,
    /// Admin rights as asserted by the transport
    pub is_admin: bool,
}

impl Actor {
    /// A regular signed-in user.
    #[must_use]
    pub const fn user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            is_admin: false,
        }
    }

    /// A signed-in admin.
    #[must_use]
    pub const fn admin(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            is_admin: true,
        }
    }

    /// A caller without identity. Every mutating operation refuses it.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            is_admin: false,
        }
    }

    /// Returns the user id or [`Error::Unauthorized`].
    pub fn id(&self) -> Result<i64> {
        self.user_id.ok_or(Error::Unauthorized)
    }

    /// Requires an identity with admin rights.
    pub fn require_admin(&self) -> Result<i64> {
        let id = self.id()?;
        if self.is_admin {
            Ok(id)
        } else {
            Err(Error::forbidden("admin access required"))
        }
    }

    /// Requires an identity that is an admin or the given owner.
    pub fn require_owner_or_admin(&self, owner_id: i64) -> Result<i64> {
        let id = self.id()?;
        if self.is_admin || id == owner_id {
            Ok(id)
        } else {
            Err(Error::forbidden("only the submitter or an admin may do this"))
        }
    }
}
