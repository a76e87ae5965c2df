use portable_atomic::{AtomicU32, Ordering};

use crate::tick::{expired, Clock};

/// The module accepted the payload of the link currently sending
pub const SEND_OK: u32 = 1 << 0;
/// The module rejected the payload of the link currently sending
pub const SEND_FAIL: u32 = 1 << 1;

/// Event bit raised for `link_id` by a send result.
pub const fn socket_bit(link_id: u8) -> u32 {
    1 << (link_id as u32 + 16)
}

/// Set of event bits shared between the URC handlers and the sender.
#[derive(Debug, Default)]
pub struct EventFlags {
    bits: AtomicU32,
}

impl EventFlags {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    pub fn set(&self, mask: u32) {
        self.bits.fetch_or(mask, Ordering::AcqRel);
    }

    pub fn clear(&self, mask: u32) {
        self.bits.fetch_and(!mask, Ordering::AcqRel);
    }

    pub fn get(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }

    /// Wait until any bit of `mask` is set, then clear the bits of `mask`.
    ///
    /// Returns the bits of `mask` that were set, or `None` once `timeout_ms`
    /// elapsed. A zero timeout checks exactly once.
    pub fn wait_any<C: Clock>(&self, mask: u32, timeout_ms: u32, clock: &C) -> Option<u32> {
        let deadline = clock.now().wrapping_add(timeout_ms);
        loop {
            let hit = self.bits.fetch_and(!mask, Ordering::AcqRel) & mask;
            if hit != 0 {
                return Some(hit);
            }
            if expired(clock.now(), deadline) {
                return None;
            }
            clock.delay_ms(1);
        }
    }
}
