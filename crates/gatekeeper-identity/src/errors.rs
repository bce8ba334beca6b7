use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("distinguished name is empty")]
    EmptyDn,
    #[error("distinguished name is {len} bytes, limit is {max}")]
    DnTooLong { len: usize, max: usize },
    #[error("control character at byte offset {0}")]
    ControlCharacter(usize),
    #[error("dangling escape at end of input")]
    DanglingEscape,
    #[error("subject has no common name")]
    MissingCommonName,
    #[error("forwarded client certificate header is {len} bytes, limit is {max}")]
    ForwardedCertTooLong { len: usize, max: usize },
    #[error("malformed forwarded client certificate header: {0}")]
    MalformedForwardedCert(String),
    #[error("forwarded client certificate header has no Subject field")]
    MissingForwardedSubject,
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let errors = vec![
            IdentityError::EmptyDn,
            IdentityError::DnTooLong { len: 3000, max: 2048 },
            IdentityError::ControlCharacter(4),
            IdentityError::DanglingEscape,
            IdentityError::MissingCommonName,
            IdentityError::ForwardedCertTooLong {
                len: 20_000,
                max: 16_384,
            },
            IdentityError::MalformedForwardedCert("unterminated quote".to_string()),
            IdentityError::MissingForwardedSubject,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
