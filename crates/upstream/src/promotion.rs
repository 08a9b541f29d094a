use model::{
    null_as_default, AdSnippet, Coupon, CrawlError, PageConfig, PromotionInfo, PromotionTags,
    Voucher,
};
use serde::Deserialize;
use serde_json::Value;

use crate::UpstreamConfig;

pub fn promotion_url(config: &UpstreamConfig, page: &PageConfig) -> String {
    format!(
        "{}?skuId={}&area={}&cat={}",
        config.promotion_endpoint,
        page.sku_id,
        config.area,
        page.joined_categories()
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromotionBody {
    #[serde(default)]
    quan: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    sku_coupon: Vec<Coupon>,
    #[serde(default, deserialize_with = "null_as_default")]
    ads: Vec<AdSnippet>,
    #[serde(default, deserialize_with = "null_as_default")]
    prom: PromotionTags,
}

/// Decodes the (already UTF-8) promotion payload.
pub fn decode_promotion(text: &str) -> Result<PromotionInfo, CrawlError> {
    let body: PromotionBody =
        serde_json::from_str(text).map_err(|err| CrawlError::Decode(format!("promotion: {err}")))?;
    Ok(PromotionInfo {
        coupons: body.sku_coupon,
        ads: body.ads,
        vouchers: normalize_vouchers(body.quan)?,
        tags: body.prom,
    })
}

/// `quan` is a single voucher object or an array of them.
fn normalize_vouchers(quan: Value) -> Result<Vec<Voucher>, CrawlError> {
    let decode = |err: serde_json::Error| CrawlError::Decode(format!("promotion quan: {err}"));
    match quan {
        Value::Null => Ok(Vec::new()),
        list @ Value::Array(_) => serde_json::from_value(list).map_err(decode),
        single @ Value::Object(_) => serde_json::from_value(single)
            .map(|voucher| vec![voucher])
            .map_err(decode),
        other => Err(CrawlError::Decode(format!(
            "promotion quan: expected object or array, got {other}"
        ))),
    }
}
