//! Cashu Standard Amount Split
//!
//! Splits a target amount into the minimal set of powers of two, the
//! canonical Cashu denomination scheme — each output amount is a distinct
//! bit of the target.

pub fn amount_split(amount: u64) -> Vec<u64> {
    let mut parts = Vec::new();
    let mut remaining = amount;
    let mut denomination = 1u64;
    while remaining > 0 {
        if remaining & 1 == 1 {
            parts.push(denomination);
        }
        remaining >>= 1;
        denomination <<= 1;
    }
    parts
}
