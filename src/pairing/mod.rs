//! Short human-typeable pairing codes.

mod error;

pub use error::{PairingError, PairingResult};

use rand::Rng;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LEN: usize = 6;
const MAX_ATTEMPTS: u32 = 10;

pub struct PairingCodeAllocator;

impl PairingCodeAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Draws a 6-character code from `[A-Z0-9]`, retrying against `is_live`
    /// until a free code is found or `MAX_ATTEMPTS` is exhausted.
    pub fn allocate(&self, is_live: impl Fn(&str) -> bool) -> PairingResult<String> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ATTEMPTS {
            let code: String = (0..CODE_LEN)
                .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                .collect();
            if !is_live(&code) {
                return Ok(code);
            }
        }
        Err(PairingError::CapacityExhausted)
    }
}

impl Default for PairingCodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_allocate_format() {
        let allocator = PairingCodeAllocator::new();
        let code = allocator.allocate(|_| false).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_allocate_retries_on_collision() {
        let allocator = PairingCodeAllocator::new();
        let seen = Cell::new(0u32);
        let code = allocator
            .allocate(|_| {
                let n = seen.get() + 1;
                seen.set(n);
                n <= 3
            })
            .unwrap();
        assert_eq!(code.len(), 6);
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn test_capacity_exhausted() {
        let allocator = PairingCodeAllocator::new();
        let result = allocator.allocate(|_| true);
        assert!(matches!(result, Err(PairingError::CapacityExhausted)));
    }
}
