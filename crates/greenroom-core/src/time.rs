//! Monotonic millisecond clock shared by every component of a run.

use std::sync::atomic::{AtomicI64, Ordering};

static LAST_MS: AtomicI64 = AtomicI64::new(0);

/// Current wall-clock time in milliseconds, guaranteed never to decrease
/// within the process. Two calls in the same millisecond return the same
/// value; a backwards wall-clock step is absorbed instead of propagated.
pub fn now_ms() -> i64 {
    let wall = chrono::Utc::now().timestamp_millis();
    let prev = LAST_MS.fetch_max(wall, Ordering::SeqCst);
    wall.max(prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_monotonic() {
        let mut last = 0;
        for _ in 0..1000 {
            let now = now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_now_ms_is_wall_clock_scale() {
        // Sanity: after 2020-01-01 in milliseconds.
        assert!(now_ms() > 1_577_836_800_000);
    }
}
