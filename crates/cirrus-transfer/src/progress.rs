//! Transfer progress and monotonic progress forwarding.

use serde::{Deserialize, Serialize};

/// Bytes moved so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes transferred.
    pub bytes: u64,
    /// Total bytes in the transfer.
    pub total_bytes: u64,
}

impl TransferProgress {
    /// Creates a progress value, clamping `bytes` to `total_bytes`.
    #[must_use]
    pub fn new(bytes: u64, total_bytes: u64) -> Self {
        Self {
            bytes: bytes.min(total_bytes),
            total_bytes,
        }
    }

    /// Completed fraction in `0.0..=1.0`. Empty transfers are complete.
    #[must_use]
    pub fn as_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes as f64 / self.total_bytes as f64
        }
    }

    /// Completed percentage, rounded down.
    #[must_use]
    pub fn as_percent(&self) -> u8 {
        (self.as_fraction() * 100.0).floor() as u8
    }

    /// Returns true once every byte has been transferred.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.bytes >= self.total_bytes
    }
}

/// Forwards progress only when it strictly increases.
///
/// # Example
///
/// ```
/// use cirrus_transfer::ProgressGate;
///
/// let mut gate = ProgressGate::new();
/// let forwarded: Vec<f64> = [0.1, 0.05, 0.3]
///     .into_iter()
///     .filter(|fraction| gate.offer(*fraction))
///     .collect();
/// assert_eq!(forwarded, vec![0.1, 0.3]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressGate {
    last: f64,
}

impl ProgressGate {
    /// Creates a gate that has forwarded nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: 0.0 }
    }

    /// Records `fraction` and returns true if it should be forwarded.
    pub fn offer(&mut self, fraction: f64) -> bool {
        if fraction > self.last {
            self.last = fraction;
            true
        } else {
            false
        }
    }

    /// The last forwarded fraction.
    #[must_use]
    pub const fn last(&self) -> f64 {
        self.last
    }
}
