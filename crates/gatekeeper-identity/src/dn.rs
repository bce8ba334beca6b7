//! Distinguished-name parsing.
//!
//! # Purpose
//! Parses the comma-separated DN strings that reach the gateway through proxy
//! headers into [`CertificateInfo`].
//!
//! # Key invariants
//! - The whole DN is rejected when it is empty, longer than [`MAX_DN_LEN`]
//!   bytes, contains a control character other than space/tab, or lacks `CN`.
//! - Individual malformed attributes are skipped rather than failing the DN:
//!   keys must be 1..=[`MAX_KEY_LEN`] ASCII alphanumerics and values must be
//!   non-empty and at most [`MAX_VALUE_LEN`] bytes after sanitizing.
//! - Attribute keys are case-insensitive; values keep their case.
//!
//! # Security considerations
//! DN strings come straight from request headers. The control-character
//! check keeps CR/LF and NUL out of log lines and storage keys.
use crate::certificate::{CertificateInfo, SubjectFields};
use crate::{IdentityError, IdentityResult};

pub const MAX_DN_LEN: usize = 2048;
pub const MAX_VALUE_LEN: usize = 256;
pub const MAX_KEY_LEN: usize = 20;

/// Parse a raw DN such as `CN=alice,O=Acme,OU=Platform`.
///
/// # Errors
/// - [`IdentityError::EmptyDn`] / [`IdentityError::DnTooLong`] on length.
/// - [`IdentityError::ControlCharacter`] on forbidden characters.
/// - [`IdentityError::DanglingEscape`] when the DN ends in a lone `\`.
/// - [`IdentityError::MissingCommonName`] when no usable `CN` is present.
pub fn parse_dn(raw: &str) -> IdentityResult<CertificateInfo> {
    if raw.is_empty() {
        return Err(IdentityError::EmptyDn);
    }
    if raw.len() > MAX_DN_LEN {
        return Err(IdentityError::DnTooLong {
            len: raw.len(),
            max: MAX_DN_LEN,
        });
    }
    if let Some((offset, _)) = raw
        .char_indices()
        .find(|(_, c)| c.is_control() && *c != '\t')
    {
        return Err(IdentityError::ControlCharacter(offset));
    }

    let mut subject = SubjectFields::default();
    let mut email = None;
    for component in split_unescaped(raw, ',')? {
        let Some((key, value)) = split_attribute(component)? else {
            continue;
        };
        let Some(value) = sanitize_value(&unescape(value)) else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "CN" => {
                if subject.common_name.is_none() {
                    subject.common_name = Some(value);
                }
            }
            "O" => subject.organization.push(value),
            "OU" => subject.organizational_unit.push(value),
            "C" => subject.country.push(value),
            "ST" => subject.province.push(value),
            "L" => subject.locality.push(value),
            "EMAILADDRESS" | "EMAIL" => {
                if email.is_none() {
                    email = Some(value);
                }
            }
            _ => {}
        }
    }

    CertificateInfo::from_fields(subject, email)
}

/// Strip control characters, trim, and enforce the per-value size limit.
pub(crate) fn sanitize_value(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.len() > MAX_VALUE_LEN {
        return None;
    }
    Some(cleaned.to_string())
}

/// Split on `sep` wherever it is not preceded by an escaping backslash.
fn split_unescaped(input: &str, sep: char) -> IdentityResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (idx, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&input[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    if escaped {
        return Err(IdentityError::DanglingEscape);
    }
    parts.push(&input[start..]);
    Ok(parts)
}

/// Split one `key=value` component. `Ok(None)` means "skip this component".
fn split_attribute(component: &str) -> IdentityResult<Option<(&str, &str)>> {
    let component = component.trim();
    if component.is_empty() {
        return Ok(None);
    }
    let pieces = split_unescaped(component, '=')?;
    if pieces.len() < 2 {
        return Ok(None);
    }
    // Only the first unescaped '=' separates key from value.
    let raw_key = pieces[0];
    let value = &component[raw_key.len() + 1..];
    let key = raw_key.trim();
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || !key.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Ok(None);
    }
    Ok(Some((key, value.trim())))
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_dn(total_len: usize) -> String {
        let mut dn = String::from("CN=testuser,L=");
        while dn.len() < total_len {
            dn.push('x');
        }
        dn
    }

    #[test]
    fn common_name_only_normalizes_to_itself() {
        let info = parse_dn("CN=testuser").expect("dn");
        assert_eq!(info.common_name, "testuser");
        assert_eq!(info.normalized_subject(), "CN=testuser");
        assert!(info.email.is_none());
    }

    #[test]
    fn length_boundary() {
        let exact = padded_dn(MAX_DN_LEN);
        assert_eq!(exact.len(), 2048);
        let info = parse_dn(&exact).expect("2048 bytes accepted");
        assert_eq!(info.normalized_subject(), "CN=testuser");

        let over = padded_dn(MAX_DN_LEN + 1);
        assert_eq!(
            parse_dn(&over),
            Err(IdentityError::DnTooLong {
                len: 2049,
                max: MAX_DN_LEN
            })
        );
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(parse_dn(""), Err(IdentityError::EmptyDn));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert_eq!(
            parse_dn("CN=test\u{0}user"),
            Err(IdentityError::ControlCharacter(7))
        );
        assert!(matches!(
            parse_dn("CN=alice\r\nX-Injected: 1"),
            Err(IdentityError::ControlCharacter(_))
        ));
        assert!(parse_dn("CN=alice,\tO=Acme").is_ok());
    }

    #[test]
    fn missing_common_name_is_rejected() {
        assert_eq!(
            parse_dn("O=Acme,OU=Platform"),
            Err(IdentityError::MissingCommonName)
        );
        assert_eq!(parse_dn("CN=   ,O=Acme"), Err(IdentityError::MissingCommonName));
    }

    #[test]
    fn ordering_and_case_do_not_change_subject() {
        let a = parse_dn("CN=alice,O=Acme,OU=Platform").expect("a");
        let b = parse_dn("ou=Platform, o=Acme, cn=alice, C=US, ST=CA, L=SF").expect("b");
        assert_eq!(a.normalized_subject(), b.normalized_subject());
        assert_eq!(b.subject.country, vec!["US".to_string()]);
        assert_eq!(b.subject.province, vec!["CA".to_string()]);
        assert_eq!(b.subject.locality, vec!["SF".to_string()]);
    }

    #[test]
    fn escaped_commas_stay_in_values() {
        let info = parse_dn(r"CN=Smith\, John,O=Acme\, Inc.").expect("dn");
        assert_eq!(info.common_name, "Smith, John");
        assert_eq!(info.normalized_subject(), r"CN=Smith\, John,O=Acme\, Inc.");
    }

    #[test]
    fn escaped_comma_cannot_forge_an_organization() {
        let forged = parse_dn(r"CN=alice\,O=Acme").expect("forged");
        let real = parse_dn("CN=alice,O=Acme").expect("real");
        assert!(forged.subject.organization.is_empty());
        assert_eq!(forged.normalized_subject(), r"CN=alice\,O\=Acme");
        assert_ne!(forged.normalized_subject(), real.normalized_subject());
        assert_eq!(
            parse_dn(&forged.normalized_subject())
                .expect("reparse")
                .normalized_subject(),
            forged.normalized_subject()
        );
    }

    #[test]
    fn dangling_escape_is_rejected() {
        assert_eq!(parse_dn("CN=alice\\"), Err(IdentityError::DanglingEscape));
    }

    #[test]
    fn malformed_attributes_are_skipped() {
        let info = parse_dn("CN=alice,garbage,X-Bad=1,TOOLONGKEYTOOLONGKEY1=v,O=").expect("dn");
        assert_eq!(info.normalized_subject(), "CN=alice");
    }

    #[test]
    fn oversized_values_are_dropped() {
        let long_org = "a".repeat(MAX_VALUE_LEN + 1);
        let info = parse_dn(&format!("CN=alice,O={long_org},OU=ops")).expect("dn");
        assert_eq!(info.normalized_subject(), "CN=alice,OU=ops");

        let long_cn = "b".repeat(MAX_VALUE_LEN + 1);
        assert_eq!(
            parse_dn(&format!("CN={long_cn}")),
            Err(IdentityError::MissingCommonName)
        );
    }

    #[test]
    fn email_keys_are_recognized() {
        let info = parse_dn("emailAddress=alice@example.com,CN=alice").expect("dn");
        assert_eq!(info.email.as_deref(), Some("alice@example.com"));
        let info = parse_dn("CN=bob,EMAIL=bob@example.com").expect("dn");
        assert_eq!(info.email.as_deref(), Some("bob@example.com"));
    }

    #[test]
    fn first_common_name_wins() {
        let info = parse_dn("CN=first,CN=second").expect("dn");
        assert_eq!(info.common_name, "first");
    }

    #[test]
    fn values_may_contain_equals() {
        let info = parse_dn("CN=a=b").expect("dn");
        assert_eq!(info.common_name, "a=b");
    }
}
