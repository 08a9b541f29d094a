use model::Coupon;

/// Coupon styles as sent by the promotion endpoint.
pub const STYLE_THRESHOLD: i64 = 0;
pub const STYLE_TIERED: i64 = 3;

/// Multiplier a coupon gives at `price`, if it gives one at all.
///
/// Threshold coupons are evaluated as if the basket were topped up to the
/// quota. Tiered coupons are shown but not priced.
pub fn coupon_factor(coupon: &Coupon, price: f64) -> Option<f64> {
    if coupon.coupon_style != STYLE_THRESHOLD {
        return None;
    }
    let basket = (coupon.quota as f64).max(price);
    if basket <= 0.0 {
        return None;
    }
    let factor = (basket - coupon.discount as f64) / basket;
    (factor != 0.0 && factor.is_finite()).then_some(factor)
}

pub(crate) fn coupon_line(coupon: &Coupon) -> String {
    match coupon.coupon_style {
        STYLE_THRESHOLD => format!(
            "【满{}减{}】{} {} {}",
            coupon.quota, coupon.discount, coupon.time_desc, coupon.name, coupon.overlap_desc
        ),
        STYLE_TIERED => format!(
            "##【{}-{}】{} {} {}",
            coupon.all_desc, coupon.high_desc, coupon.time_desc, coupon.name, coupon.overlap_desc
        ),
        other => format!("Unknown Coupon Style: {other}"),
    }
}
