//! EIP-1559 fee policy.

/// Multiplier applied when the latest block is more than half full.
pub const CONGESTION_SURCHARGE: f64 = 1.127;

/// Fees attached to a transaction, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasParameters {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Derive fees from the latest block.
///
/// `base = max(base_fee, gas_price) * multiplier`, raised by
/// [`CONGESTION_SURCHARGE`] when `gas_used / gas_limit > 0.5`. The priority fee
/// is added on top for the max fee.
pub fn compute_gas(
    base_fee: Option<u64>,
    gas_price: u128,
    gas_used: u64,
    gas_limit: u64,
    priority_fee: u128,
    multiplier: f64,
) -> GasParameters {
    let floor = u128::from(base_fee.unwrap_or(0)).max(gas_price);
    let mut base = floor as f64 * multiplier;
    if gas_limit > 0 && gas_used as f64 / gas_limit as f64 > 0.5 {
        base *= CONGESTION_SURCHARGE;
    }

    GasParameters {
        max_fee_per_gas: base as u128 + priority_fee,
        max_priority_fee_per_gas: priority_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const GWEI: u128 = 1_000_000_000;

    #[test_case(Some(10), 5, 10 ; "base fee dominates")]
    #[test_case(Some(5), 10, 10 ; "gas price dominates")]
    #[test_case(None, 7, 7 ; "pre-london block")]
    fn test_floor_selection(base_fee_gwei: Option<u64>, gas_price_gwei: u128, expected_gwei: u128) {
        let gas = compute_gas(
            base_fee_gwei.map(|g| g * GWEI as u64),
            gas_price_gwei * GWEI,
            10,
            100,
            0,
            1.0,
        );
        assert_eq!(gas.max_fee_per_gas, expected_gwei * GWEI);
    }

    #[test]
    fn test_congested_block_surcharge() {
        let quiet = compute_gas(Some(1_000_000), 0, 50, 100, 0, 1.0);
        let busy = compute_gas(Some(1_000_000), 0, 51, 100, 0, 1.0);
        assert_eq!(quiet.max_fee_per_gas, 1_000_000);
        assert!(busy.max_fee_per_gas.abs_diff(1_127_000) <= 1);
    }

    #[test]
    fn test_priority_added_to_max_fee() {
        let gas = compute_gas(Some(100), 0, 0, 100, 25, 2.0);
        assert_eq!(
            gas,
            GasParameters {
                max_fee_per_gas: 225,
                max_priority_fee_per_gas: 25,
            }
        );
    }

    #[test]
    fn test_zero_gas_limit() {
        let gas = compute_gas(Some(100), 0, 5, 0, 0, 1.0);
        assert_eq!(gas.max_fee_per_gas, 100);
    }

    proptest! {
        #[test]
        fn prop_max_fee_covers_priority(
            base_fee in proptest::option::of(0u64..1_000_000_000_000),
            gas_price in 0u128..1_000_000_000_000,
            used in 0u64..30_000_000,
            priority in 0u128..10_000_000_000,
            multiplier in 1.0f64..2.0,
        ) {
            let gas = compute_gas(base_fee, gas_price, used, 30_000_000, priority, multiplier);
            prop_assert!(gas.max_fee_per_gas >= gas.max_priority_fee_per_gas);
            prop_assert!(gas.max_fee_per_gas >= u128::from(base_fee.unwrap_or(0)).max(gas_price) + priority);
        }
    }
}
