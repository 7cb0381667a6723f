//! A single place that reads wall-clock time, so tests can reason about it
//! without every caller re-deriving the `UNIX_EPOCH` dance.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
pub fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before unix epoch").as_secs() as i64
}
