//! Gatekeeper RBAC primitives shared by the gateway service and its tests.
//!
//! # Purpose
//! Defines permissions, roles, the six predefined roles, the request-scoped
//! [`AuthenticatedUser`] and the skip-path matcher used by the
//! authentication pipeline.
//!
//! # How it fits
//! The gateway resolves a certificate subject to a stored user and role, then
//! builds an [`AuthenticatedUser`] from this crate. Guards call
//! [`AuthenticatedUser::has_permission`] for every protected route.
//!
//! # Key invariants
//! - Permission strings are `resource:action` and are compared by exact
//!   string equality, never as patterns.
//! - Platform admins pass every permission check regardless of the
//!   permissions listed on their role.
//! - A user without a role has no permissions.
//!
//! # Examples
//! ```rust
//! use gatekeeper_authz::{AuthenticatedUser, Permission, predefined};
//!
//! let viewer = predefined::default_roles(chrono::Utc::now())
//!     .into_iter()
//!     .find(|role| role.name == predefined::VIEWER)
//!     .unwrap();
//! let user = AuthenticatedUser::new("u-1", "t-1", "CN=alice", "alice", Some(viewer));
//! assert!(user.has_permission(&Permission::parse("deployments:read").unwrap()));
//! assert!(!user.has_permission(&Permission::parse("deployments:delete").unwrap()));
//! ```
//!
//! # Common pitfalls
//! - Treating `*` inside a permission as a wildcard. Only skip paths are
//!   glob-matched.
//! - Storing `is_platform_admin` on a user. It is always derived from the role.

mod errors;
mod matcher;
mod permission;
pub mod predefined;
mod role;
mod user;

pub use errors::{AuthzError, AuthzResult};
pub use matcher::{PathPattern, SkipPathMatcher, wildcard_match};
pub use permission::Permission;
pub use role::{Role, RoleType};
pub use user::AuthenticatedUser;
