//! Caller identity primitives shared by the Gatekeeper service and its tests.
//!
//! # Purpose
//! Turns the three transport-level identity sources a gateway sees (a native
//! TLS peer certificate, an `X-Forwarded-Client-Cert` header and a raw
//! `X-SSL-Client-DN` header) into one [`CertificateInfo`] and a normalized
//! subject string.
//!
//! # How it fits
//! The authentication pipeline calls into this crate once per request. The
//! normalized subject it produces is the only key used to look users up in
//! the identity store, so every transport path must agree on it.
//!
//! # Key invariants
//! - All inputs are untrusted. Parsing never panics; malformed input is an
//!   [`IdentityError`].
//! - A DN longer than [`MAX_DN_LEN`] bytes or containing control characters
//!   other than space/tab is rejected outright.
//! - The normalized subject only ever contains `CN`, the first `O` and the
//!   first `OU`, in that order.
//!
//! # Examples
//! ```rust
//! use gatekeeper_identity::parse_dn;
//!
//! let info = parse_dn("OU=Platform, cn=alice, O=Acme, C=US").unwrap();
//! assert_eq!(info.normalized_subject(), "CN=alice,O=Acme,OU=Platform");
//! ```
//!
//! # Common pitfalls
//! - Using the raw DN as a lookup key. Two proxies may order or case the
//!   attributes differently; always use [`CertificateInfo::normalized_subject`].

mod certificate;
mod dn;
mod errors;
mod xfcc;

pub use certificate::{CertificateInfo, PeerCertificate, SubjectFields};
pub use dn::{MAX_DN_LEN, MAX_KEY_LEN, MAX_VALUE_LEN, parse_dn};
pub use errors::{IdentityError, IdentityResult};
pub use xfcc::{MAX_XFCC_LEN, parse_xfcc, subject_from_xfcc};
