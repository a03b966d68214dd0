//! Process-wide randomness source.
//!
//! Defaults to the operating system RNG and can be swapped exactly once at
//! program start, before any keys are generated. The swap is one-shot so a
//! late caller cannot silently downgrade the source mid-run.

use std::sync::Mutex;

use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use rand_core::CryptoRng;

use crate::ToolError;

static CUSTOM_RNG: OnceCell<Mutex<Box<dyn RngCore + Send>>> = OnceCell::new();

/// Replaces the default OS randomness source.
///
/// Only the first call has an effect; returns whether the source was
/// installed. The caller is responsible for the cryptographic quality of the
/// replacement.
pub fn set_custom_rng(rng: Box<dyn RngCore + Send>) -> bool {
    CUSTOM_RNG.set(Mutex::new(rng)).is_ok()
}

/// Fills the buffer from the configured randomness source.
pub fn fill_random(buf: &mut [u8]) -> Result<(), ToolError> {
    match CUSTOM_RNG.get() {
        Some(rng) => {
            let mut rng = rng.lock().expect("rng lock poisoned");
            rng.try_fill_bytes(buf).map_err(|_| ToolError::InsufficientRandom)
        }
        None => OsRng.try_fill_bytes(buf).map_err(|_| ToolError::InsufficientRandom),
    }
}

/// Returns the requested amount of random bytes.
pub fn random_bytes(n: usize) -> Result<Vec<u8>, ToolError> {
    let mut buf = vec![0u8; n];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// RNG handle over the configured source, for primitives that take a
/// `rand_core` generator.
///
/// Marked as cryptographically secure because the default source is the OS
/// RNG and replacements are expected to match it.
pub struct JessRng;

impl RngCore for JessRng {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_be_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_be_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        fill_random(dest).expect("randomness source failed");
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        fill_random(dest).map_err(rand_core::Error::new)
    }
}

impl CryptoRng for JessRng {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_has_requested_length() {
        let bytes = random_bytes(16).unwrap();
        assert_eq!(bytes.len(), 16);
    }

    #[test]
    fn successive_draws_differ() {
        let a = random_bytes(32).unwrap();
        let b = random_bytes(32).unwrap();
        assert_ne!(a, b, "two 256 bit draws must not collide");
    }
}
