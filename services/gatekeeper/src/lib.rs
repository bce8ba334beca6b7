//! Gatekeeper service library crate.
//!
//! # Purpose
//! Exposes the authentication pipeline, guards, identity store backends,
//! configuration and admin API for use by the binary and tests.
pub mod api;
pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod model;
pub mod observability;
pub mod store;
