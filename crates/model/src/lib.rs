mod encoding;
mod error;
mod gateway;
mod price;
mod product;
mod promotion;

pub use encoding::decode_gbk;
pub use error::CrawlError;
pub use gateway::{Boundaries, HistoryRow, NotificationGateway, PersistenceGateway};
pub use price::{is_unavailable, round_half_up, DELISTED_PRICE};
pub use product::{format_elapsed, PageConfig, PriceRecord, ProductId, TrackedProduct};
pub use promotion::{
    null_as_default, AdSnippet, Coupon, Gift, PriceQuote, PromotionInfo, PromotionTag, PromotionTags, Voucher,
};
