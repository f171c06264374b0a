//! HMAC-SHA256 request signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs a Binance query string: `hex(HMAC-SHA256(secret, query))`.
///
/// The result is appended to the query as `&signature=...`.
pub fn sign(secret: &str, query: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("hmac accepts any key length"),
    };
    mac.update(query.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
