//! Certificate and client metadata extraction from an HTTP request.
//!
//! Sources are tried in a fixed order and never merged: the native peer
//! certificate extension, then `X-Forwarded-Client-Cert`, then
//! `X-SSL-Client-DN`. Proxy headers are only consulted when trusted. The
//! first source that is present decides the outcome; if it is malformed the
//! request is treated as carrying no certificate.
use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, HeaderValue};
use gatekeeper_identity::{CertificateInfo, PeerCertificate, parse_dn, subject_from_xfcc};
use std::net::SocketAddr;

pub const FORWARDED_CLIENT_CERT: &str = "x-forwarded-client-cert";
pub const SSL_CLIENT_DN: &str = "x-ssl-client-dn";
pub const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateSource {
    Peer,
    ForwardedClientCert,
    SslClientDn,
}

impl CertificateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateSource::Peer => "peer",
            CertificateSource::ForwardedClientCert => "xfcc",
            CertificateSource::SslClientDn => "ssl_client_dn",
        }
    }
}

pub fn extract_certificate(
    extensions: &Extensions,
    headers: &HeaderMap,
    trust_proxy_headers: bool,
) -> Option<(CertificateInfo, CertificateSource)> {
    if let Some(peer) = extensions.get::<PeerCertificate>() {
        return parsed(CertificateSource::Peer, CertificateInfo::from_peer(peer));
    }
    if !trust_proxy_headers {
        return None;
    }
    if let Some(value) = headers.get(FORWARDED_CLIENT_CERT) {
        let source = CertificateSource::ForwardedClientCert;
        return header_text(source, value)
            .and_then(|text| parsed(source, subject_from_xfcc(text)));
    }
    if let Some(value) = headers.get(SSL_CLIENT_DN) {
        let source = CertificateSource::SslClientDn;
        return header_text(source, value).and_then(|text| parsed(source, parse_dn(text)));
    }
    None
}

fn header_text(source: CertificateSource, value: &HeaderValue) -> Option<&str> {
    match std::str::from_utf8(value.as_bytes()) {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::debug!(source = source.as_str(), error = %err, "certificate header is not utf-8");
            None
        }
    }
}

fn parsed(
    source: CertificateSource,
    result: gatekeeper_identity::IdentityResult<CertificateInfo>,
) -> Option<(CertificateInfo, CertificateSource)> {
    match result {
        Ok(info) => Some((info, source)),
        Err(err) => {
            tracing::debug!(source = source.as_str(), error = %err, "ignoring malformed client certificate");
            None
        }
    }
}

/// Client address: first `X-Forwarded-For` hop when proxy headers are
/// trusted, otherwise the socket peer address.
pub fn client_ip(
    extensions: &Extensions,
    headers: &HeaderMap,
    trust_proxy_headers: bool,
) -> Option<String> {
    if trust_proxy_headers {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(ip) = forwarded {
            return Some(ip.to_string());
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).expect("header"));
        }
        map
    }

    fn peer() -> PeerCertificate {
        PeerCertificate {
            common_name: Some("alice".to_string()),
            organization: vec!["Acme".to_string()],
            ..PeerCertificate::default()
        }
    }

    #[test]
    fn peer_certificate_wins_over_headers() {
        let mut extensions = Extensions::new();
        extensions.insert(peer());
        let headers = headers(&[(SSL_CLIENT_DN, "CN=mallory")]);
        let (info, source) = extract_certificate(&extensions, &headers, true).expect("cert");
        assert_eq!(source, CertificateSource::Peer);
        assert_eq!(info.normalized_subject(), "CN=alice,O=Acme");
    }

    #[test]
    fn xfcc_is_preferred_over_raw_dn() {
        let headers = headers(&[
            (FORWARDED_CLIENT_CERT, r#"Hash=abc;Subject="CN=bob,O=Acme""#),
            (SSL_CLIENT_DN, "CN=mallory"),
        ]);
        let (info, source) = extract_certificate(&Extensions::new(), &headers, true).expect("cert");
        assert_eq!(source, CertificateSource::ForwardedClientCert);
        assert_eq!(info.normalized_subject(), "CN=bob,O=Acme");
    }

    #[test]
    fn malformed_first_source_does_not_fall_through() {
        let headers = headers(&[
            (FORWARDED_CLIENT_CERT, "Hash=abc"),
            (SSL_CLIENT_DN, "CN=mallory"),
        ]);
        assert!(extract_certificate(&Extensions::new(), &headers, true).is_none());
    }

    #[test]
    fn raw_dn_header_is_parsed() {
        let headers = headers(&[(SSL_CLIENT_DN, "O=Acme,CN=carol")]);
        let (info, source) = extract_certificate(&Extensions::new(), &headers, true).expect("cert");
        assert_eq!(source, CertificateSource::SslClientDn);
        assert_eq!(info.normalized_subject(), "CN=carol,O=Acme");
    }

    #[test]
    fn untrusted_proxy_headers_are_ignored() {
        let headers = headers(&[(SSL_CLIENT_DN, "CN=carol")]);
        assert!(extract_certificate(&Extensions::new(), &headers, false).is_none());
    }

    #[test]
    fn transport_paths_normalize_identically() {
        let mut extensions = Extensions::new();
        extensions.insert(peer());
        let from_peer = extract_certificate(&extensions, &HeaderMap::new(), true)
            .expect("peer")
            .0
            .normalized_subject();
        let from_xfcc = extract_certificate(
            &Extensions::new(),
            &headers(&[(FORWARDED_CLIENT_CERT, r#"Subject="o=Acme,cn=alice""#)]),
            true,
        )
        .expect("xfcc")
        .0
        .normalized_subject();
        let from_dn = extract_certificate(
            &Extensions::new(),
            &headers(&[(SSL_CLIENT_DN, "O=Acme, CN=alice")]),
            true,
        )
        .expect("dn")
        .0
        .normalized_subject();
        assert_eq!(from_peer, from_xfcc);
        assert_eq!(from_peer, from_dn);
    }

    #[test]
    fn client_ip_prefers_trusted_forwarded_for() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4433))));
        let headers = headers(&[(FORWARDED_FOR, "203.0.113.9, 10.0.0.1")]);
        assert_eq!(
            client_ip(&extensions, &headers, true).as_deref(),
            Some("203.0.113.9")
        );
        assert_eq!(
            client_ip(&extensions, &headers, false).as_deref(),
            Some("10.0.0.7")
        );
        assert!(client_ip(&Extensions::new(), &HeaderMap::new(), true).is_none());
    }

    #[test]
    fn user_agent_is_copied() {
        let headers = headers(&[("user-agent", "curl/8.0")]);
        assert_eq!(user_agent(&headers).as_deref(), Some("curl/8.0"));
        assert!(user_agent(&HeaderMap::new()).is_none());
    }
}
