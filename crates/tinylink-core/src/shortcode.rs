use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Number of hex characters kept from the URL digest.
pub const LENGTH: usize = 8;

/// The short identifier of a stored link.
///
/// Codes are the first eight lowercase hex characters of the SHA-256
/// digest of the long URL, so shortening the same URL twice always yields
/// the same code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    /// Derives the short code for `long_url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tinylink_core::ShortCode;
    ///
    /// let code = ShortCode::from_url("http://ya.ru");
    /// assert_eq!(code.as_str(), "398f0ca4");
    /// ```
    pub fn from_url(long_url: &str) -> Self {
        let digest = Sha256::digest(long_url.as_bytes());
        let mut hex = format!("{:x}", digest);
        hex.truncate(LENGTH);
        Self(hex)
    }

    /// Parses a caller-supplied code.
    ///
    /// Valid codes are exactly eight characters of `[0-9a-f]`.
    pub fn new(code: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Wraps a code read back from a trusted backend without validation.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    fn validate(code: &str) -> std::result::Result<(), CoreError> {
        if code.len() != LENGTH {
            return Err(CoreError::InvalidShortCode(format!(
                "length must be {}, got {}",
                LENGTH,
                code.len()
            )));
        }

        if !code
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(CoreError::InvalidShortCode(format!(
                "must contain only lowercase hex characters: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_prefix() {
        assert_eq!(ShortCode::from_url("http://ya.ru").as_str(), "398f0ca4");
    }

    #[test]
    fn shortening_is_deterministic() {
        let first = ShortCode::from_url("https://example.com/some/long/path?q=1");
        let second = ShortCode::from_url("https://example.com/some/long/path?q=1");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), LENGTH);
    }

    #[test]
    fn different_urls_usually_differ() {
        assert_ne!(
            ShortCode::from_url("http://a.com"),
            ShortCode::from_url("http://b.com")
        );
    }

    #[test]
    fn empty_url_still_hashes() {
        // SHA-256 of the empty string starts with e3b0c442.
        assert_eq!(ShortCode::from_url("").as_str(), "e3b0c442");
    }

    #[test]
    fn valid_codes() {
        assert!(ShortCode::new("398f0ca4").is_ok());
        assert!(ShortCode::new("00000000").is_ok());
    }

    #[test]
    fn wrong_length() {
        assert!(ShortCode::new("398f0ca").is_err());
        assert!(ShortCode::new("398f0ca41").is_err());
        assert!(ShortCode::new("").is_err());
    }

    #[test]
    fn invalid_characters() {
        assert!(ShortCode::new("398F0CA4").is_err());
        assert!(ShortCode::new("398f0cag").is_err());
        assert!(ShortCode::new("398f/ca4").is_err());
    }

    #[test]
    fn to_url_trims_trailing_slash() {
        let code = ShortCode::from_url("http://ya.ru");
        assert_eq!(code.to_url("http://localhost:8080"), "http://localhost:8080/398f0ca4");
        assert_eq!(code.to_url("http://localhost:8080/"), "http://localhost:8080/398f0ca4");
    }

    #[test]
    fn serializes_as_plain_string() {
        let code = ShortCode::from_url("http://ya.ru");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"398f0ca4\"");
    }
}
