//! Fee schedule and revenue split.
//!
//! Pure functions over method + amount; all money values are integer minor
//! units. The fee is always recomputed from the stored method and amount so
//! the merchant-facing fee contract stays stable even when the gateway's own
//! reported fee drifts.

use serde::Serialize;

/// QRIS switches from percent+flat to a flat percentage at this amount.
const QRIS_TIER_THRESHOLD: i64 = 110_000;
/// Flat fee for all virtual-account methods.
const VA_FLAT_FEE: i64 = 4_500;

fn round_rate(amount: i64, rate: f64) -> i64 {
    (amount as f64 * rate).round() as i64
}

/// Total provider fee for a method and gross amount.
///
/// Unrecognized methods and non-positive amounts cost nothing rather than
/// erroring; the create path validates inputs before money moves.
pub fn total_fee(method: &str, amount: i64) -> i64 {
    let method = method.to_lowercase();
    let amount = amount.max(0);

    if method == "qris" {
        if amount >= QRIS_TIER_THRESHOLD {
            return round_rate(amount, 0.025);
        }
        return round_rate(amount, 0.02) + 500;
    }

    if method.ends_with("_va") {
        return VA_FLAT_FEE;
    }

    if method == "paypal" {
        return round_rate(amount, 0.03);
    }

    0
}

/// How a collected fee is divided between the platform and the gateway
/// provider. Shares are non-negative and always sum to the fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevenueSplit {
    pub platform_share: i64,
    pub provider_share: i64,
}

/// Split a fee against the configured platform cut.
pub fn split_revenue(total_fee: i64, platform_fee_setting: i64) -> RevenueSplit {
    let fee = total_fee.max(0);
    let platform_share = fee.min(platform_fee_setting.max(0));
    let provider_share = fee - platform_share;

    RevenueSplit {
        platform_share,
        provider_share,
    }
}

/// Net amount the merchant receives after the fee.
pub fn received_amount(amount: i64, total_fee: i64) -> i64 {
    (amount.max(0) - total_fee.max(0)).max(0)
}
