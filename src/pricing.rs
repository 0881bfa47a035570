//! Pricing and Quote Encoding
//!
//! Converts a byte length into the sat price a client owes, and builds the
//! [`PaymentQuote`] advertised in `x-cashu` response headers.

use crate::types::{PaymentQuote, Unit};

const BYTES_PER_MB: u64 = 1024 * 1024;
const FREE_BELOW_BYTES: u64 = 1024;

/// `ceil`-ish integer pricing: free under 1KB, otherwise `mb / rate`
/// floored to a minimum of 1 sat. `rate == 0` means the content is free —
/// guarded here rather than dividing by zero.
pub fn amount(bytes: u64, rate_sat_per_mb: u64) -> u64 {
    if rate_sat_per_mb == 0 {
        return 0;
    }
    if bytes < FREE_BELOW_BYTES {
        return 1;
    }
    let mb = bytes / BYTES_PER_MB;
    let res = mb / rate_sat_per_mb;
    if res == 0 {
        1
    } else {
        res
    }
}

pub fn build_quote(amount: u64, mints: Vec<String>, pubkey: String) -> PaymentQuote {
    PaymentQuote {
        amount,
        unit: Unit::Sat,
        mints,
        pubkey,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_below_one_kilobyte() {
        assert_eq!(amount(0, 1), 1);
        assert_eq!(amount(1023, 1), 1);
    }

    #[test]
    fn floors_to_one_sat_minimum() {
        assert_eq!(amount(2048, 1), 1);
        assert_eq!(amount(512 * 1024, 1), 1);
    }

    #[test]
    fn scales_with_megabytes_and_rate() {
        assert_eq!(amount(4 * 1024 * 1024, 1), 4);
        assert_eq!(amount(4 * 1024 * 1024, 2), 2);
    }

    #[test]
    fn zero_rate_is_free_not_a_panic() {
        assert_eq!(amount(10 * 1024 * 1024, 0), 0);
    }

    #[test]
    fn is_a_pure_function() {
        assert_eq!(amount(2048, 1), amount(2048, 1));
    }
}
