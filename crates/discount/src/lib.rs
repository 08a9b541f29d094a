//! Stacks coupons and promotion tags into one effective price and renders
//! the promotion summary shown next to it.

mod coupon;
mod tag;

use std::fmt::Write;

use chrono::{Local, TimeZone};
use model::{is_unavailable, round_half_up, PageConfig, PromotionInfo};
use tracing::trace;

pub use coupon::{coupon_factor, STYLE_THRESHOLD, STYLE_TIERED};
pub use tag::{ordered_tags, tag_discount, TagDiscount, CODE_BULK, CODE_REDUCTION};

/// Site-wide "spend 200, save 10" voucher every order can use.
pub const BASELINE_DISCOUNT: f64 = 0.95;
pub const DEFAULT_ITEM_BASE: &str = "https://item.jd.com";
pub const CONTENT_BEGIN: &str = "<!--begin-->";
pub const CONTENT_END: &str = "<!--end-->";

const LINE_BREAK: &str = "<br />";

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub content: String,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct DiscountEngine {
    baseline: f64,
    item_base: String,
}

impl Default for DiscountEngine {
    fn default() -> Self {
        Self::new(BASELINE_DISCOUNT, DEFAULT_ITEM_BASE)
    }
}

impl DiscountEngine {
    pub fn new(baseline: f64, item_base: impl Into<String>) -> Self {
        Self {
            baseline,
            item_base: item_base.into(),
        }
    }

    /// Effective price in cents precision plus the rendered content row.
    ///
    /// Coupon factors compete with the baseline and the best one is applied
    /// once; tag factors compete among themselves and the best one is
    /// applied once. Unavailable prices pass through untouched, tax included.
    pub fn resolve(
        &self,
        price: f64,
        page: &PageConfig,
        promotion: &PromotionInfo,
        tax: f64,
    ) -> Resolution {
        let item = format!("{}/{}.html", self.item_base, page.sku_id);
        let mut buf = String::new();
        let _ = write!(
            buf,
            "<tr><td><a href='{item}' target='_blank'><img src='{}' /></a></td><td>",
            page.image_url
        );
        if let Some(begin) = flash_time(page.ko_begin_time) {
            let _ = write!(buf, "<font color='red'>【京东秒杀{begin}开始】</font>");
        }
        if let Some(end) = flash_time(page.ko_end_time) {
            let _ = write!(buf, "<font color='red'>【京东秒杀{end}结束】</font>");
        }
        let _ = write!(
            buf,
            "<a href='{item}' target='_blank'>{}</a>{LINE_BREAK}{CONTENT_BEGIN}",
            page.name
        );

        let mut coupon_best = self.baseline;
        for coupon in &promotion.coupons {
            buf.push_str(&coupon::coupon_line(coupon));
            if let Some(factor) = coupon_factor(coupon, price) {
                let _ = write!(buf, "<!--dis={factor:.6}-->");
                coupon_best = coupon_best.min(factor);
            }
            buf.push_str(LINE_BREAK);
        }
        for ad in promotion.ads.iter().filter(|ad| !ad.ad.is_empty()) {
            let _ = write!(buf, "{}{LINE_BREAK}", ad.ad);
        }
        for voucher in &promotion.vouchers {
            let _ = write!(
                buf,
                "【满额返券】<a href='{}' target='_blank'>{}</a>{LINE_BREAK}",
                voucher.act_url, voucher.title
            );
        }

        let mut tag_best = 1.0_f64;
        for tag in ordered_tags(&promotion.tags) {
            buf.push_str(&tag::tag_line(tag, &self.item_base));
            let discount = tag_discount(tag, price);
            buf.push_str(&discount.annotation);
            if let Some(factor) = discount.factor {
                let _ = write!(buf, "<!--dis={factor:.6}-->");
                tag_best = tag_best.min(factor);
            }
            buf.push_str(LINE_BREAK);
        }

        if buf.ends_with(LINE_BREAK) {
            buf.truncate(buf.len() - LINE_BREAK.len());
        }
        let _ = write!(buf, "{CONTENT_END}</td></tr>");

        let price = if is_unavailable(price) {
            price
        } else {
            trace!(price, coupon_best, tag_best, tax, "stacking discounts");
            round_half_up(price * tag_best * coupon_best + tax)
        };
        Resolution {
            content: buf,
            price,
        }
    }
}

fn flash_time(millis: i64) -> Option<String> {
    if millis == 0 {
        return None;
    }
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%m-%d %H:%M").to_string())
}
