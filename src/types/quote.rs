//! Payment Quote Wire Type
//!
//! Sent back to clients, base64url-JSON-encoded, in the `x-cashu` response
//! header whenever a request needs payment (402) or wants to advertise the
//! price up front (`HEAD` requests).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Sat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub amount: u64,
    pub unit: Unit,
    pub mints: Vec<String>,
    pub pubkey: String,
}
