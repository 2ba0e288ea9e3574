//! WINDOW_UPDATE emission policy.

use crate::codec::LocalWindow;

/// Decide whether a receive window deserves a WINDOW_UPDATE now, and if so
/// by how much. Updates are withheld until half the window has been
/// consumed, then restore it to its ceiling in one increment; emitting
/// before the window drains keeps upload throughput from paying an RTT.
/// The returned increment is always positive.
pub fn window_update_increment(window: LocalWindow) -> Option<u32> {
    if window.unacked == 0 || window.limit == 0 {
        return None;
    }
    if window.unacked < window.limit / 2 {
        return None;
    }
    Some(window.unacked)
}

#[cfg(test)]
mod tests {
    use super::window_update_increment;
    use crate::codec::LocalWindow;

    #[test]
    fn no_update_for_untouched_window() {
        assert_eq!(
            window_update_increment(LocalWindow {
                unacked: 0,
                limit: 65_535,
            }),
            None
        );
    }

    #[test]
    fn no_update_below_half_consumption() {
        assert_eq!(
            window_update_increment(LocalWindow {
                unacked: 1024,
                limit: 65_535,
            }),
            None
        );
    }

    #[test]
    fn restores_window_after_half_consumed() {
        assert_eq!(
            window_update_increment(LocalWindow {
                unacked: 40_000,
                limit: 65_535,
            }),
            Some(40_000)
        );
    }

    #[test]
    fn increment_is_never_zero() {
        for unacked in [1u32, 100, 65_535] {
            for limit in [1u32, 2, 65_535] {
                if let Some(increment) = window_update_increment(LocalWindow { unacked, limit }) {
                    assert!(increment > 0);
                }
            }
        }
    }
}
