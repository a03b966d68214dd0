//! Process-global security configuration.
//!
//! The minima only ever raise the effective values of new sessions, never
//! lower them. Both setters are meant to run once at program start.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

static DEFAULT_SECURITY_LEVEL: AtomicI32 = AtomicI32::new(128);
static MINIMUM_SECURITY_LEVEL: AtomicI32 = AtomicI32::new(0);

static DEFAULT_SYMMETRIC_KEY_SIZE: AtomicUsize = AtomicUsize::new(16);
static MINIMUM_SYMMETRIC_KEY_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Sets a global minimum security level. Operations that fall below it are
/// refused.
pub fn set_minimum_security_level(security_level: i32) {
    DEFAULT_SECURITY_LEVEL.store(security_level, Ordering::Relaxed);
    MINIMUM_SECURITY_LEVEL.store(security_level, Ordering::Relaxed);
}

/// Sets a global default symmetric key size in bytes, used as a fallback
/// when the size cannot be derived from the suite.
pub fn set_default_key_size(size_in_bytes: usize) {
    DEFAULT_SYMMETRIC_KEY_SIZE.store(size_in_bytes, Ordering::Relaxed);
    MINIMUM_SYMMETRIC_KEY_SIZE.store(size_in_bytes, Ordering::Relaxed);
}

pub(crate) fn default_security_level() -> i32 {
    DEFAULT_SECURITY_LEVEL.load(Ordering::Relaxed)
}

pub(crate) fn minimum_security_level() -> i32 {
    MINIMUM_SECURITY_LEVEL.load(Ordering::Relaxed)
}

pub(crate) fn default_symmetric_key_size() -> usize {
    DEFAULT_SYMMETRIC_KEY_SIZE.load(Ordering::Relaxed)
}

pub(crate) fn minimum_symmetric_key_size() -> usize {
    MINIMUM_SYMMETRIC_KEY_SIZE.load(Ordering::Relaxed)
}
