use std::ops::Sub;

use serde::{Deserialize, Serialize};

/// Monotonic clock reading in fractional milliseconds since an arbitrary origin.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const fn from_millis(ms: f64) -> Self {
        Self(ms)
    }

    pub fn as_millis(self) -> f64 {
        self.0
    }
}

impl Sub for Timestamp {
    /// Elapsed milliseconds; may be non-finite when either reading is.
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        self.0 - rhs.0
    }
}
