/// Price reported by the quote endpoint for a delisted SKU.
pub const DELISTED_PRICE: f64 = -1.0;

/// Negative prices mean the SKU cannot be bought right now. They are
/// recorded but never become a tracked minimum.
pub fn is_unavailable(price: f64) -> bool {
    price < 0.0
}

/// Rounds to cents, halves away from zero for positive values.
///
/// `f64::round` works on the binary value and would turn 99.995 into 99.99;
/// shifting by half a cent before truncating keeps parity with the stored
/// history.
pub fn round_half_up(price: f64) -> f64 {
    (price * 100.0 + 0.5).trunc() / 100.0
}
