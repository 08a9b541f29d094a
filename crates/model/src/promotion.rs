use serde::{Deserialize, Deserializer, Serialize};

/// Entry of the price-quote array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    #[serde(rename = "p", default)]
    pub price: String,
    #[serde(rename = "op", default)]
    pub origin_price: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromotionInfo {
    pub coupons: Vec<Coupon>,
    pub ads: Vec<AdSnippet>,
    /// Full-reduction vouchers, normalised from the object-or-array `quan`.
    pub vouchers: Vec<Voucher>,
    pub tags: PromotionTags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Coupon {
    pub coupon_style: i64,
    pub quota: i64,
    pub discount: i64,
    pub time_desc: String,
    pub name: String,
    pub overlap_desc: String,
    pub all_desc: String,
    pub high_desc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdSnippet {
    pub id: String,
    pub ad: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Voucher {
    pub title: String,
    pub act_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionTags {
    #[serde(deserialize_with = "null_as_default")]
    pub pick_one_tag: Vec<PromotionTag>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<PromotionTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionTag {
    /// Promotion type, e.g. "15" threshold reduction, "19" bulk-buy.
    pub code: String,
    pub pid: String,
    pub name: String,
    pub content: String,
    #[serde(deserialize_with = "null_as_default")]
    pub adurl: String,
    #[serde(deserialize_with = "null_as_default")]
    pub gifts: Vec<Gift>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gift {
    pub nm: String,
    pub sid: String,
    pub num: i64,
}

/// The promotion endpoint sends `null` for empty lists as often as it omits them.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
