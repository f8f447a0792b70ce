//! Pairing token issuance.
//!
//! A token is 24 bytes from the OS CSPRNG, base64url-encoded without padding,
//! embedded in a shareable URL under the `/#/s/` fragment route.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::RelayError;

/// Number of random bytes drawn per token.
pub const TOKEN_BYTES: usize = 24;

/// Encoded length of a token: 24 bytes -> 32 base64url chars, no padding.
pub const TOKEN_LEN: usize = TOKEN_BYTES.div_ceil(3) * 4;

/// Path template prefix placed between the origin and the token.
pub const PAIR_PATH: &str = "/#/s/";

/// A freshly issued pairing token and the URL that embeds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingToken {
    /// 32-char base64url token.
    pub token: String,
    /// Shareable URL embedding the token.
    pub url: String,
}

impl PairingToken {
    /// Short, non-reversible identifier safe to put in logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        URL_SAFE_NO_PAD.encode(&digest[..6])
    }
}

/// Issue a token using the operating system's secure random source.
pub fn issue_token(origin: &str) -> Result<PairingToken, RelayError> {
    issue_token_with(&mut OsRng, origin)
}

/// Issue a token from the given cryptographic RNG.
///
/// Read failures propagate as [`RelayError::RandomSourceUnavailable`]; there
/// is no fallback to a weaker generator.
pub fn issue_token_with<R>(rng: &mut R, origin: &str) -> Result<PairingToken, RelayError>
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; TOKEN_BYTES];
    rng.try_fill_bytes(&mut bytes)?;
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let url = pairing_url(origin, &token);
    Ok(PairingToken { token, url })
}

/// Source of pairing tokens, injected where tokens are handed out.
pub trait TokenIssuer: Send + Sync {
    /// Issue a fresh token embedded in a URL under `origin`.
    fn issue(&self, origin: &str) -> Result<PairingToken, RelayError>;
}

/// Issuer backed by the operating system's secure random source.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsTokenIssuer;

impl TokenIssuer for OsTokenIssuer {
    fn issue(&self, origin: &str) -> Result<PairingToken, RelayError> {
        issue_token(origin)
    }
}

/// Join an origin and a token into the shareable pairing URL.
pub fn pairing_url(origin: &str, token: &str) -> String {
    format!("{}{PAIR_PATH}{token}", origin.trim_end_matches('/'))
}

/// Whether `s` has the exact shape of an issued token.
pub fn is_token_shaped(s: &str) -> bool {
    s.len() == TOKEN_LEN
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testutil::UnavailableRng;

    #[test]
    fn token_has_fixed_length_and_alphabet() {
        let issued = issue_token("https://a.example").unwrap();
        assert_eq!(issued.token.len(), 32);
        assert_eq!(TOKEN_LEN, 32);
        assert!(is_token_shaped(&issued.token), "got: {}", issued.token);
        assert!(!issued.token.contains('='));
    }

    #[test]
    fn url_embeds_origin_and_token() {
        let issued = issue_token("https://a.example").unwrap();
        assert_eq!(issued.url, format!("https://a.example/#/s/{}", issued.token));
    }

    #[test]
    fn trailing_slash_on_origin_is_collapsed() {
        assert_eq!(pairing_url("http://host:3000/", "abc"), "http://host:3000/#/s/abc");
    }

    #[test]
    fn empty_origin_yields_relative_url() {
        assert_eq!(pairing_url("", "abc"), "/#/s/abc");
    }

    #[test]
    fn large_sample_is_pairwise_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let issued = issue_token("http://localhost").unwrap();
            assert!(is_token_shaped(&issued.token));
            assert!(seen.insert(issued.token), "duplicate token issued");
        }
    }

    #[test]
    fn broken_random_source_is_a_hard_failure() {
        let err = issue_token_with(&mut UnavailableRng, "http://localhost").unwrap_err();
        assert!(matches!(err, RelayError::RandomSourceUnavailable(_)), "got: {err:?}");
        assert!(err.to_string().contains("entropy source unavailable"));
    }

    #[test]
    fn shape_check_rejects_padding_and_foreign_chars() {
        assert!(!is_token_shaped("short"));
        assert!(!is_token_shaped(&"A".repeat(31)));
        assert!(!is_token_shaped(&format!("{}=", "A".repeat(31))));
        assert!(!is_token_shaped(&format!("{}+", "A".repeat(31))));
        assert!(is_token_shaped(&format!("{}-_", "A".repeat(30))));
    }

    #[test]
    fn os_issuer_matches_free_function_shape() {
        let issued = OsTokenIssuer.issue("https://a.example").unwrap();
        assert!(is_token_shaped(&issued.token));
        assert!(issued.url.starts_with("https://a.example/#/s/"));
    }

    #[test]
    fn fingerprint_is_stable_and_not_the_token() {
        let issued = issue_token("http://localhost").unwrap();
        assert_eq!(issued.fingerprint(), issued.fingerprint());
        assert_eq!(issued.fingerprint().len(), 8);
    }
}
