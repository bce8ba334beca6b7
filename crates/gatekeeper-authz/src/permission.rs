//! Permission tokens.
//!
//! # Purpose
//! A [`Permission`] is an opaque `resource:action` string such as
//! `subscriptions:create`.
//!
//! # Key invariants
//! - Both halves are non-empty and consist of lowercase ASCII letters,
//!   digits, `_` or `-`.
//! - Equality is plain string equality. `deployments:*` is a literal token,
//!   not a wildcard, and fails validation.
//!
//! # Examples
//! ```rust
//! use gatekeeper_authz::Permission;
//!
//! let permission = Permission::new("subscriptions", "create").unwrap();
//! assert_eq!(permission.as_str(), "subscriptions:create");
//! assert_eq!(permission.resource(), "subscriptions");
//! ```
use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// Wrap a compile-time token without validation.
    ///
    /// Only for literals in this workspace; untrusted input goes through
    /// [`Permission::parse`].
    pub const fn from_static(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }

    /// Build a permission from its resource and action halves.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidPermission`] if either half is empty or has
    ///   characters outside `[a-z0-9_-]`.
    pub fn new(resource: &str, action: &str) -> AuthzResult<Self> {
        Self::parse(&format!("{resource}:{action}"))
    }

    /// Parse a `resource:action` string from untrusted input.
    pub fn parse(value: &str) -> AuthzResult<Self> {
        let (resource, action) = value
            .split_once(':')
            .ok_or_else(|| AuthzError::InvalidPermission(value.to_string()))?;
        if !valid_part(resource) || !valid_part(action) {
            return Err(AuthzError::InvalidPermission(value.to_string()));
        }
        Ok(Self(Cow::Owned(value.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resource(&self) -> &str {
        self.0.split_once(':').map(|(r, _)| r).unwrap_or(&*self.0)
    }

    pub fn action(&self) -> &str {
        self.0.split_once(':').map(|(_, a)| a).unwrap_or("")
    }
}

fn valid_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

impl std::str::FromStr for Permission {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Permission {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.0.into_owned()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
