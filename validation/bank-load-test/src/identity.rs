//! Process-wide identity allocation for virtual users.
//!
//! Usernames on the target service must be unique, so every virtual user draws
//! its ordinals from one shared allocator. The allocator is created by the
//! runner and handed to each user explicitly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing, never repeated ordinals.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    next: AtomicU64,
}

impl IdentityAllocator {
    /// Allocator whose first identity is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Allocator whose first identity is `first`.
    ///
    /// Useful when several runs target the same service instance and the
    /// usernames of an earlier run are still registered.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next identity.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The identity the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
