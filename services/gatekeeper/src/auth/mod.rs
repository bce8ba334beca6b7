//! Authentication and authorization for inbound requests.
//!
//! # Purpose
//! The [`authenticate`] middleware resolves the caller behind a client
//! certificate into a [`RequestContext`]; [`Guard`] and [`RouteGuard`]
//! decide what that caller may do.
//!
//! # How it fits
//! `app.rs` installs the pipeline as the outermost router layer and the route
//! guards as `route_layer`s on tenant-scoped and platform-only groups.
//! Handlers read the caller with the [`RequestContext`] or [`CurrentUser`]
//! extractors.
mod context;
pub mod extract;
pub mod guards;
mod last_login;
mod pipeline;

pub use context::{CurrentUser, RequestContext};
pub use guards::{Guard, GuardRule, RouteGuard, enforce};
pub use last_login::LastLoginUpdater;
pub use pipeline::{AuthPipeline, REQUEST_ID_HEADER, authenticate};
