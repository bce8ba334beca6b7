//! `X-Forwarded-Client-Cert` parsing.
//!
//! Envoy-style XFCC headers are a comma-separated list of elements, one per
//! proxy hop, each a semicolon-separated list of `Key=Value` pairs. Values may
//! be double-quoted, in which case `,`, `;` and `=` are literal and `\"`
//! escapes a quote. Only the first element (the hop closest to the client) is
//! used for identity.
use crate::dn::parse_dn;
use crate::{CertificateInfo, IdentityError, IdentityResult};

pub const MAX_XFCC_LEN: usize = 16 * 1024;

/// Parse the first XFCC element into its `(key, value)` pairs.
///
/// Keys are returned as written; lookups should be case-insensitive.
/// Pairs without `=` or with an empty key are skipped.
pub fn parse_xfcc(header: &str) -> IdentityResult<Vec<(String, String)>> {
    if header.len() > MAX_XFCC_LEN {
        return Err(IdentityError::ForwardedCertTooLong {
            len: header.len(),
            max: MAX_XFCC_LEN,
        });
    }

    let mut pairs = Vec::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;
    let mut chars = header.chars();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '\\' => match chars.next() {
                    Some(next) => value.push(next),
                    None => {
                        return Err(IdentityError::MalformedForwardedCert(
                            "dangling escape in quoted value".to_string(),
                        ));
                    }
                },
                '"' => in_quotes = false,
                _ => value.push(c),
            }
            continue;
        }
        match c {
            '"' if in_value && value.trim().is_empty() => {
                value.clear();
                in_quotes = true;
            }
            '=' if !in_value => in_value = true,
            ';' => {
                push_pair(&mut pairs, &mut key, &mut value, in_value);
                in_value = false;
            }
            // End of the first element.
            ',' => break,
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    if in_quotes {
        return Err(IdentityError::MalformedForwardedCert(
            "unterminated quoted value".to_string(),
        ));
    }
    push_pair(&mut pairs, &mut key, &mut value, in_value);
    Ok(pairs)
}

fn push_pair(
    pairs: &mut Vec<(String, String)>,
    key: &mut String,
    value: &mut String,
    had_separator: bool,
) {
    let k = key.trim();
    if had_separator && !k.is_empty() {
        pairs.push((k.to_string(), value.trim().to_string()));
    }
    key.clear();
    value.clear();
}

/// Extract and parse the `Subject` DN carried in an XFCC header.
pub fn subject_from_xfcc(header: &str) -> IdentityResult<CertificateInfo> {
    let pairs = parse_xfcc(header)?;
    let subject = pairs
        .into_iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("subject"))
        .map(|(_, value)| value)
        .ok_or(IdentityError::MissingForwardedSubject)?;
    parse_dn(&subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_subject_is_parsed() {
        let header = r#"Hash=abc123;Subject="CN=alice,O=Acme,OU=Platform";URI=spiffe://acme/alice"#;
        let info = subject_from_xfcc(header).expect("xfcc");
        assert_eq!(info.normalized_subject(), "CN=alice,O=Acme,OU=Platform");
    }

    #[test]
    fn pairs_keep_order_and_values() {
        let pairs = parse_xfcc(r#"By=spiffe://mesh/gw;Hash=ff;Subject="CN=a,O=b""#).expect("pairs");
        assert_eq!(
            pairs,
            vec![
                ("By".to_string(), "spiffe://mesh/gw".to_string()),
                ("Hash".to_string(), "ff".to_string()),
                ("Subject".to_string(), "CN=a,O=b".to_string()),
            ]
        );
    }

    #[test]
    fn only_first_element_is_used() {
        let header = r#"Subject="CN=client";Hash=1,Subject="CN=proxy";Hash=2"#;
        let info = subject_from_xfcc(header).expect("xfcc");
        assert_eq!(info.common_name, "client");
    }

    #[test]
    fn subject_key_is_case_insensitive() {
        let info = subject_from_xfcc(r#"subject="CN=bob""#).expect("xfcc");
        assert_eq!(info.common_name, "bob");
    }

    #[test]
    fn escaped_quotes_inside_values() {
        let pairs = parse_xfcc(r#"Subject="CN=a \"quoted\" name""#).expect("pairs");
        assert_eq!(pairs[0].1, r#"CN=a "quoted" name"#);
    }

    #[test]
    fn missing_subject_is_an_error() {
        assert_eq!(
            subject_from_xfcc("Hash=abc;By=spiffe://x"),
            Err(IdentityError::MissingForwardedSubject)
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert!(matches!(
            parse_xfcc(r#"Subject="CN=alice"#),
            Err(IdentityError::MalformedForwardedCert(_))
        ));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let header = format!("Subject=\"CN={}\"", "a".repeat(MAX_XFCC_LEN));
        assert!(matches!(
            parse_xfcc(&header),
            Err(IdentityError::ForwardedCertTooLong { .. })
        ));
    }

    #[test]
    fn pairs_without_separator_are_skipped() {
        let pairs = parse_xfcc("junk;Subject=CN=x").expect("pairs");
        assert_eq!(pairs, vec![("Subject".to_string(), "CN=x".to_string())]);
    }

    #[test]
    fn unquoted_subject_with_single_attribute() {
        let info = subject_from_xfcc("Subject=CN=svc").expect("xfcc");
        assert_eq!(info.normalized_subject(), "CN=svc");
    }

    #[test]
    fn invalid_dn_inside_header_propagates() {
        assert_eq!(
            subject_from_xfcc(r#"Subject="O=Acme""#),
            Err(IdentityError::MissingCommonName)
        );
    }
}
