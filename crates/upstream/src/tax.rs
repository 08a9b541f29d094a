use model::{CrawlError, ProductId};
use serde::Deserialize;

use crate::UpstreamConfig;

/// Currency sign preceding the tax amount in the free-text message.
pub const TAX_MARKER: char = '￥';

pub fn tax_url(config: &UpstreamConfig, id: ProductId) -> String {
    format!("{}?skuId={id}", config.tax_endpoint)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlobalBuy {
    #[serde(default)]
    success: bool,
    tax_txt: Option<TaxText>,
}

#[derive(Deserialize)]
struct TaxText {
    #[serde(default)]
    content: String,
}

/// Reads the tax amount out of a cross-border purchase answer.
///
/// An unsuccessful answer means the item is not cross-border: no tax.
pub fn parse_tax(text: &str) -> Result<f64, CrawlError> {
    let body: GlobalBuy =
        serde_json::from_str(text).map_err(|err| CrawlError::Decode(format!("tax: {err}")))?;
    if !body.success {
        return Ok(0.0);
    }
    let content = body.tax_txt.map(|t| t.content).unwrap_or_default();
    let pos = content
        .find(TAX_MARKER)
        .ok_or_else(|| CrawlError::Extraction(format!("tax: no `{TAX_MARKER}` in {content:?}")))?;
    let rest = content[pos + TAX_MARKER.len_utf8()..].trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    rest[..end]
        .parse::<f64>()
        .map_err(|err| CrawlError::Decode(format!("tax amount {:?}: {err}", &rest[..end])))
}
