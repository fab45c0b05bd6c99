//! Random `nonce_str` values.

use rand::RngExt;
use rand::distr::Alphanumeric;
use rand::rng;

/// Length of the strings produced by [`nonce_str`].
pub const NONCE_LEN: usize = 32;

/// Generates a 32-character alphanumeric string for the `nonce_str` field.
#[must_use]
pub fn nonce_str() -> String {
    rng()
        .sample_iter(Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_alphanumeric_and_fresh() {
        let a = nonce_str();
        let b = nonce_str();
        assert_eq!(a.len(), NONCE_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
