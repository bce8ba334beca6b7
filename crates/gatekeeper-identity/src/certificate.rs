//! Parsed certificate identity and subject normalization.
use crate::dn::sanitize_value;
use crate::{IdentityError, IdentityResult};
use serde::{Deserialize, Serialize};

/// Subject attributes recognized by the gateway.
///
/// Repeated attributes keep their order of appearance; normalization only
/// looks at the first organization and organizational unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFields {
    pub common_name: Option<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub province: Vec<String>,
    pub locality: Vec<String>,
}

impl SubjectFields {
    /// Render the canonical `CN=..,O=..,OU=..` form used as the lookup key.
    ///
    /// Values are escaped, so a CN containing `,O=` can never render the same
    /// key as a subject that really carries that organization.
    pub fn normalized(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(cn) = &self.common_name {
            parts.push(format!("CN={}", escape_value(cn)));
        }
        if let Some(org) = self.organization.first() {
            parts.push(format!("O={}", escape_value(org)));
        }
        if let Some(unit) = self.organizational_unit.first() {
            parts.push(format!("OU={}", escape_value(unit)));
        }
        parts.join(",")
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Identity extracted from a client certificate, whatever transport carried it.
///
/// # Invariants
/// - `common_name` is non-empty and equals `subject.common_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: SubjectFields,
    pub common_name: String,
    pub email: Option<String>,
}

impl CertificateInfo {
    pub(crate) fn from_fields(
        subject: SubjectFields,
        email: Option<String>,
    ) -> IdentityResult<Self> {
        let common_name = subject
            .common_name
            .clone()
            .ok_or(IdentityError::MissingCommonName)?;
        Ok(Self {
            subject,
            common_name,
            email,
        })
    }

    /// Build identity from a certificate presented on the TLS connection.
    ///
    /// Attribute values go through the same sanitizing rules as DN strings;
    /// values that end up empty or oversized are dropped.
    pub fn from_peer(peer: &PeerCertificate) -> IdentityResult<Self> {
        fn clean(values: &[String]) -> Vec<String> {
            values.iter().filter_map(|v| sanitize_value(v)).collect()
        }

        let subject = SubjectFields {
            common_name: peer.common_name.as_deref().and_then(sanitize_value),
            organization: clean(&peer.organization),
            organizational_unit: clean(&peer.organizational_unit),
            country: clean(&peer.country),
            province: clean(&peer.province),
            locality: clean(&peer.locality),
        };
        let email = peer
            .email_addresses
            .iter()
            .find_map(|value| sanitize_value(value));
        Self::from_fields(subject, email)
    }

    pub fn normalized_subject(&self) -> String {
        self.subject.normalized()
    }
}

/// Subject attributes of a verified peer certificate.
///
/// The TLS acceptor inserts this as a request extension after the handshake;
/// the gateway never parses DER itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificate {
    pub common_name: Option<String>,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub province: Vec<String>,
    pub locality: Vec<String>,
    pub email_addresses: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_omits_absent_fields() {
        let fields = SubjectFields {
            common_name: Some("svc".to_string()),
            organizational_unit: vec!["ops".to_string()],
            ..SubjectFields::default()
        };
        assert_eq!(fields.normalized(), "CN=svc,OU=ops");
    }

    #[test]
    fn normalized_uses_first_org_and_unit() {
        let fields = SubjectFields {
            common_name: Some("svc".to_string()),
            organization: vec!["Acme".to_string(), "Other".to_string()],
            organizational_unit: vec!["a".to_string(), "b".to_string()],
            country: vec!["US".to_string()],
            ..SubjectFields::default()
        };
        assert_eq!(fields.normalized(), "CN=svc,O=Acme,OU=a");
    }

    #[test]
    fn peer_certificate_requires_common_name() {
        let peer = PeerCertificate {
            organization: vec!["Acme".to_string()],
            ..PeerCertificate::default()
        };
        assert_eq!(
            CertificateInfo::from_peer(&peer),
            Err(IdentityError::MissingCommonName)
        );
    }

    #[test]
    fn peer_certificate_sanitizes_values() {
        let peer = PeerCertificate {
            common_name: Some("alice\u{7}".to_string()),
            organization: vec!["".to_string(), "Acme".to_string()],
            email_addresses: vec!["alice@example.com".to_string()],
            ..PeerCertificate::default()
        };
        let info = CertificateInfo::from_peer(&peer).expect("peer");
        assert_eq!(info.common_name, "alice");
        assert_eq!(info.normalized_subject(), "CN=alice,O=Acme");
        assert_eq!(info.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn separators_inside_values_are_escaped() {
        let fields = SubjectFields {
            common_name: Some(r"a=b\c,d".to_string()),
            ..SubjectFields::default()
        };
        assert_eq!(fields.normalized(), r"CN=a\=b\\c\,d");
    }

    #[test]
    fn crafted_peer_common_name_cannot_impersonate() {
        let forged = PeerCertificate {
            common_name: Some("alice,O=Acme".to_string()),
            ..PeerCertificate::default()
        };
        let real = PeerCertificate {
            common_name: Some("alice".to_string()),
            organization: vec!["Acme".to_string()],
            ..PeerCertificate::default()
        };
        let forged = CertificateInfo::from_peer(&forged).expect("forged");
        let real = CertificateInfo::from_peer(&real).expect("real");
        assert_eq!(real.normalized_subject(), "CN=alice,O=Acme");
        assert_eq!(forged.normalized_subject(), r"CN=alice\,O\=Acme");
        assert_ne!(forged.normalized_subject(), real.normalized_subject());
    }

    #[test]
    fn peer_and_dn_paths_normalize_identically() {
        let peer = PeerCertificate {
            common_name: Some("alice".to_string()),
            organization: vec!["Acme".to_string()],
            organizational_unit: vec!["Platform".to_string()],
            ..PeerCertificate::default()
        };
        let from_peer = CertificateInfo::from_peer(&peer).expect("peer");
        let from_dn = crate::parse_dn("ou=Platform,O=Acme,cn=alice").expect("dn");
        assert_eq!(from_peer.normalized_subject(), from_dn.normalized_subject());
    }
}
