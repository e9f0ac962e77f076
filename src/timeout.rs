//! Wraparound-safe timeout checks on a free running millisecond counter.

/// Default time to wait for a boot-up message, in ms.
pub const TIMEOUT_BOOT_MS: u32 = 3000;
/// Default time to wait for an SDO response, in ms.
pub const TIMEOUT_SDO_MS: u32 = 1000;

/// Bounds must stay below half of the counter range.
pub(crate) const MAX_BOUND: u32 = 1 << 31;

/// Returns true once at least `bound` ms have passed between `start` and `now`.
///
/// The counter may wrap between the two readings; the elapsed time is the
/// magnitude of the signed two's complement difference. `bound` must be
/// less than 2^31.
pub fn expired(start: u32, now: u32, bound: u32) -> bool {
    debug_assert!(bound < MAX_BOUND, "timeout bound out of range");
    let delta = now.wrapping_sub(start) as i32;
    delta.unsigned_abs() >= bound
}

/// Per-service bounds for the blocking request/response calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Waiting for a boot-up message.
    pub boot_ms: u32,
    /// Waiting for an SDO response.
    pub sdo_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            boot_ms: TIMEOUT_BOOT_MS,
            sdo_ms: TIMEOUT_SDO_MS,
        }
    }
}
