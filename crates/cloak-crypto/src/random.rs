//! CSPRNG access.
//!
//! All randomness comes from the operating system generator. A failing
//! entropy source is reported as [`CryptoError::EntropyUnavailable`] and is
//! never papered over with a weaker fallback.

use rand::RngCore;

use crate::{CryptoError, Result};

/// Fill `buf` from the OS CSPRNG.
///
/// # Errors
///
/// - [`CryptoError::EntropyUnavailable`] if the OS generator fails
pub fn fill(buf: &mut [u8]) -> Result<()> {
    rand::rngs::OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))
}

/// Draw `N` random bytes from the OS CSPRNG.
pub fn bytes<const N: usize>() -> Result<[u8; N]> {
    let mut out = [0u8; N];
    fill(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_not_repeated() {
        let a = bytes::<32>().expect("entropy");
        let b = bytes::<32>().expect("entropy");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fill_empty_buffer() {
        let mut buf = [0u8; 0];
        fill(&mut buf).expect("empty fill");
    }
}
