//! Utility functions for keyfleet

use rand::Rng;
use std::time::Duration;

/// Validate a key before it takes part in arbitration
pub fn validate_key(key: &str, max_len: usize) -> crate::Result<()> {
    if key.len() > max_len {
        return Err(crate::Error::KeyTooLong {
            len: key.len(),
            max: max_len,
        });
    }
    Ok(())
}

/// Random pause in `[min, max)` milliseconds, used to de-synchronise retries
pub fn jitter(range_ms: [u64; 2]) -> Duration {
    let [min, max] = range_ms;
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min..max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("user-42", 128).is_ok());
        assert!(validate_key("", 128).is_ok());
        assert!(validate_key(&"x".repeat(128), 128).is_ok());
        assert!(matches!(
            validate_key(&"x".repeat(129), 128),
            Err(crate::Error::KeyTooLong { len: 129, max: 128 })
        ));
    }

    #[test]
    fn test_jitter_bounds() {
        for _ in 0..100 {
            let d = jitter([50, 100]);
            assert!(d >= Duration::from_millis(50));
            assert!(d < Duration::from_millis(100));
        }
        assert_eq!(jitter([30, 30]), Duration::from_millis(30));
    }
}
