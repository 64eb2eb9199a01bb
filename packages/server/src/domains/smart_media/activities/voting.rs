//! Vote weight from token holdings.

/// Holdings at or above this count as a large holder.
pub const LARGE_HOLDER_BALANCE: u128 = 1_000_000;

/// Votes an account contributes, from its token balance.
///
/// No tokens is still one vote; any holding is two; a large holding is three.
pub fn vote_weight(balance: u128) -> u64 {
    if balance == 0 {
        1
    } else if balance < LARGE_HOLDER_BALANCE {
        2
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn weight_tiers() {
        assert_eq!(vote_weight(0), 1);
        assert_eq!(vote_weight(1), 2);
        assert_eq!(vote_weight(999_999), 2);
        assert_eq!(vote_weight(1_000_000), 3);
        assert_eq!(vote_weight(u128::MAX), 3);
    }

    proptest! {
        #[test]
        fn weight_never_decreases_with_balance(a in any::<u128>(), b in any::<u128>()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(vote_weight(low) <= vote_weight(high));
        }

        #[test]
        fn weight_is_between_one_and_three(balance in any::<u128>()) {
            prop_assert!((1..=3).contains(&vote_weight(balance)));
        }
    }
}
