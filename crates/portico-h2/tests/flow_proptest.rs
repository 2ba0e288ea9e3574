use portico_h2::codec::LocalWindow;
use portico_h2::flow_control::window_update_increment;
use proptest::prelude::*;

proptest! {
    #[test]
    fn increments_are_positive_and_bounded_by_consumption(
        unacked in 0u32..=(1 << 30),
        limit in 1u32..=(1 << 30),
    ) {
        let window = LocalWindow { unacked, limit };
        if let Some(increment) = window_update_increment(window) {
            prop_assert!(increment > 0);
            prop_assert_eq!(increment, unacked);
        }
    }

    #[test]
    fn no_update_is_emitted_below_half_window(
        limit in 2u32..=(1 << 30),
    ) {
        let window = LocalWindow {
            unacked: limit / 2 - 1,
            limit,
        };
        prop_assert_eq!(window_update_increment(window), None);
    }

    #[test]
    fn update_is_emitted_once_half_the_window_is_consumed(
        limit in 2u32..=(1 << 30),
    ) {
        let window = LocalWindow {
            unacked: limit / 2,
            limit,
        };
        prop_assert!(window_update_increment(window).is_some());
    }
}
