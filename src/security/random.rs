//! Cryptographically secure random tokens.
//!
//! Everything here reads straight from the operating system generator. There is
//! no fallback: a token we cannot make unpredictable is a token we do not issue.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy in a CSRF token.
pub const CSRF_TOKEN_BYTES: usize = 32;

/// Bytes of entropy in a CSP nonce.
pub const NONCE_BYTES: usize = 16;

/// Bytes of entropy in a session identifier.
pub const SESSION_ID_BYTES: usize = 32;

/// The operating system generator failed.
#[derive(Debug, thiserror::Error)]
#[error("secure random source unavailable: {0}")]
pub struct RandomError(#[from] rand::Error);

/// Text encoding for a generated token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEncoding {
    /// URL-safe alphabet without padding; safe in cookies and form fields.
    UrlSafe,
    /// Standard alphabet with padding; what CSP nonces conventionally use.
    Standard,
}

/// Fill a fresh buffer of `len` bytes from the OS generator.
pub fn random_bytes(len: usize) -> Result<Vec<u8>, RandomError> {
    let mut buf = vec![0u8; len];
    OsRng.try_fill_bytes(&mut buf)?;
    Ok(buf)
}

/// Generate `len` random bytes and encode them.
pub fn token(len: usize, encoding: TokenEncoding) -> Result<String, RandomError> {
    let bytes = random_bytes(len)?;
    Ok(match encoding {
        TokenEncoding::UrlSafe => URL_SAFE_NO_PAD.encode(bytes),
        TokenEncoding::Standard => STANDARD.encode(bytes),
    })
}

/// Like [`token`], but treats an unavailable generator as fatal.
///
/// CSRF tokens and CSP nonces are only worth anything if they are
/// unpredictable, and a broken entropy source will not heal between requests.
/// The process is aborted rather than unwound so no panic barrier can turn this
/// into a served response.
pub fn token_or_abort(len: usize, encoding: TokenEncoding) -> String {
    match token(len, encoding) {
        Ok(token) => token,
        Err(err) => {
            tracing::error!(error = %err, "Secure randomness unavailable, aborting");
            std::process::abort();
        }
    }
}

/// Probe the generator once at startup.
pub fn ensure_available() -> Result<(), RandomError> {
    random_bytes(1).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(0).unwrap().len(), 0);
        assert_eq!(random_bytes(32).unwrap().len(), 32);
    }

    #[test]
    fn test_url_safe_token_alphabet() {
        let token = token(CSRF_TOKEN_BYTES, TokenEncoding::UrlSafe).unwrap();
        // 32 bytes -> 43 chars without padding
        assert_eq!(token.len(), 43);
        assert!(token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    #[test]
    fn test_standard_token_is_padded() {
        let token = token(NONCE_BYTES, TokenEncoding::Standard).unwrap();
        assert_eq!(token.len(), 24);
        assert!(token.ends_with("=="));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(token_or_abort(NONCE_BYTES, TokenEncoding::Standard)));
        }
    }

    #[test]
    fn test_generator_is_available() {
        assert!(ensure_available().is_ok());
    }
}
