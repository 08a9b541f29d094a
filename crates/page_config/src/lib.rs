//! Reads the `pageConfig` object literal embedded in product pages.

mod script;

use model::{decode_gbk, CrawlError, PageConfig};
use tracing::debug;

pub use script::{run, Scope, ScriptError, Value};

pub const CONFIG_MARKER: &str = "var pageConfig";
pub const CONFIG_TERMINATOR: &str = "};";
pub const DEFAULT_IMAGE_BASE: &str = "http://img14.360buyimg.com/n1/";

/// Extraction result: the typed config plus the decoded literal it came from,
/// which the crawl keeps for the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub config: PageConfig,
    pub literal: String,
}

pub trait ConfigExtractor: Send + Sync {
    fn extract(&self, page: &[u8]) -> Result<Extracted, CrawlError>;
}

/// Marker-slice, decode and evaluate, in that order.
#[derive(Debug, Clone)]
pub struct PageConfigExtractor {
    image_base: String,
}

impl Default for PageConfigExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_BASE)
    }
}

impl PageConfigExtractor {
    pub fn new(image_base: impl Into<String>) -> Self {
        Self {
            image_base: image_base.into(),
        }
    }
}

impl ConfigExtractor for PageConfigExtractor {
    fn extract(&self, page: &[u8]) -> Result<Extracted, CrawlError> {
        let raw = slice_literal(page)?;
        let literal = decode_gbk(raw, "page config")?;
        let scope = run(&literal).map_err(|err| CrawlError::Decode(format!("page config: {err}")))?;
        let config = read_config(&scope, &self.image_base);
        debug!(sku = config.sku_id, categories = ?config.categories, "page config evaluated");
        Ok(Extracted { config, literal })
    }
}

/// Slices from the marker through the first terminator after it.
///
/// Works on raw bytes: both markers are ASCII and the page is only decoded
/// once the span is known.
pub fn slice_literal(page: &[u8]) -> Result<&[u8], CrawlError> {
    let begin = find(page, CONFIG_MARKER.as_bytes())
        .ok_or_else(|| CrawlError::Extraction(format!("`{CONFIG_MARKER}` not in page")))?;
    let rest = &page[begin..];
    let end = find(rest, CONFIG_TERMINATOR.as_bytes()).ok_or_else(|| {
        CrawlError::Extraction(format!("`{CONFIG_TERMINATOR}` not after `{CONFIG_MARKER}`"))
    })?;
    Ok(&rest[..end + CONFIG_TERMINATOR.len()])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn read_config(scope: &Scope, image_base: &str) -> PageConfig {
    let product = |field: &str| scope.lookup(&format!("pageConfig.product.{field}"));
    PageConfig {
        sku_id: product("skuid").to_integer(),
        name: product("name").to_text(),
        ko_begin_time: product("koBeginTime").to_integer(),
        ko_end_time: product("koEndTime").to_integer(),
        image_url: format!("{image_base}{}", product("src").to_text()),
        categories: product("cat").to_integer_list(),
    }
}
