//! Shareable payment links.
//!
//! A link is `{base_url}/{commitment hex}`. It carries no secret and can be
//! rebuilt from the commitment alone.

use cloak_types::Commitment;

use crate::{CommitmentError, Result};

/// Default base for shareable links.
pub const DEFAULT_BASE_URL: &str = "https://pay.private";

/// Build the shareable link for `commitment`.
pub fn shareable_link(base_url: &str, commitment: &Commitment) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/{}", hex::encode(commitment.as_bytes()))
}

/// Recover the commitment from a shareable link.
///
/// Only the final path segment is inspected, so links built against any
/// base URL parse.
pub fn parse_shareable_link(link: &str) -> Result<Commitment> {
    let segment = link
        .trim_end_matches('/')
        .rsplit_once('/')
        .map(|(_, last)| last)
        .ok_or_else(|| CommitmentError::InvalidLink(format!("no path segment in {link:?}")))?;
    Commitment::parse(segment).map_err(|e| CommitmentError::InvalidLink(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_is_deterministic() {
        let c = Commitment::from_bytes([0xAB; 32]);
        let link = shareable_link(DEFAULT_BASE_URL, &c);
        assert_eq!(link, format!("https://pay.private/{}", "ab".repeat(32)));
        assert_eq!(link, shareable_link("https://pay.private/", &c));
    }

    #[test]
    fn test_link_reconstructs_commitment() {
        let c = Commitment::from_bytes([0x5C; 32]);
        let link = shareable_link("https://example.test/claim", &c);
        assert_eq!(parse_shareable_link(&link).expect("parse"), c);
    }

    #[test]
    fn test_parse_rejects_truncated() {
        assert!(parse_shareable_link("https://pay.private/abcdef").is_err());
        assert!(parse_shareable_link("no-slashes").is_err());
    }
}
