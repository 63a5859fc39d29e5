//! Conversions between wei and display denominations

/// Wei per gwei
pub const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Wei per ether
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Wei → ether
pub fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETH as f64
}

/// Wei → gwei
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / WEI_PER_GWEI as f64
}

/// Gwei → wei, rounded to the nearest wei. Negative input clamps to zero.
pub fn gwei_to_wei(gwei: f64) -> u128 {
    (gwei * WEI_PER_GWEI as f64).round().max(0.0) as u128
}

/// Apply a multiplicative factor to an integer amount, rounded to the nearest unit
pub fn scale(amount: u128, factor: f64) -> u128 {
    (amount as f64 * factor).round().max(0.0) as u128
}
