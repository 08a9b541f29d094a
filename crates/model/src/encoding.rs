use encoding_rs::GBK;

use crate::CrawlError;

/// Decodes GBK bytes, rejecting malformed sequences instead of replacing them.
pub fn decode_gbk(bytes: &[u8], what: &str) -> Result<String, CrawlError> {
    GBK.decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| CrawlError::Encoding(what.to_string()))
}
