//! Signed order tracking tokens.
//!
//! A guest who verified an order (order number + email + phone) receives a
//! token that lets them read that one order without signing in. The token is
//! an HMAC-SHA256 of the order ID under the configured tracking secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use storefront_core::OrderId;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded result (64 characters).
///
/// # Panics
///
/// Never in practice: HMAC accepts keys of any size per RFC 2104, so
/// `new_from_slice` cannot fail for `Hmac<Sha256>`.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Tracking token for `order_id`.
#[must_use]
pub fn tracking_token(secret: &str, order_id: &OrderId) -> String {
    hmac_sha256_hex(secret, &format!("order:{order_id}"))
}

/// Whether `token` is the tracking token for `order_id`.
#[must_use]
pub fn verify_tracking_token(secret: &str, order_id: &OrderId, token: &str) -> bool {
    constant_time_eq(&tracking_token(secret, order_id), token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_sha256_matches_known_vector() {
        let result = hmac_sha256_hex("key", "The quick brown fox jumps over the lazy dog");
        assert_eq!(
            result,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn constant_time_eq_compares_exactly() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }

    #[test]
    fn tracking_token_is_bound_to_order_and_secret() {
        let order = OrderId::generate();
        let other = OrderId::generate();
        let token = tracking_token("secret", &order);

        assert_eq!(token.len(), 64);
        assert!(verify_tracking_token("secret", &order, &token));
        assert!(!verify_tracking_token("secret", &other, &token));
        assert!(!verify_tracking_token("other-secret", &order, &token));
        assert!(!verify_tracking_token("secret", &order, ""));
    }
}
