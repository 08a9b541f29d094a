use std::cmp::Ordering;
use std::sync::LazyLock;

use model::{PromotionTag, PromotionTags};
use regex::Regex;

/// Threshold or bundle reduction.
pub const CODE_REDUCTION: &str = "15";
/// Bulk-buy percentage.
pub const CODE_BULK: &str = "19";

static BUNDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)(?:元选(\d+(?:\.\d+)?))?").expect("valid regex"));
static SPEND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)?)(?:元(\d+(?:\.\d+)?))?").expect("valid regex"));
static BULK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^打\s*(\d+(?:\.\d+)?)折").expect("valid regex"));

/// Pick-one tags followed by general tags, ordered by (code, pid).
///
/// Ordering keeps rendering reproducible and groups tags of one type.
pub fn ordered_tags(tags: &PromotionTags) -> Vec<&PromotionTag> {
    let mut all: Vec<&PromotionTag> = tags.pick_one_tag.iter().chain(&tags.tags).collect();
    all.sort_by(|a, b| match a.code.cmp(&b.code) {
        Ordering::Equal => a.pid.cmp(&b.pid),
        other => other,
    });
    all
}

/// Discount multiplier parsed from a tag's text, plus the debug annotation
/// rendered next to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TagDiscount {
    pub factor: Option<f64>,
    pub annotation: String,
}

pub fn tag_discount(tag: &PromotionTag, price: f64) -> TagDiscount {
    match tag.code.as_str() {
        CODE_REDUCTION => {
            let (a, b, factor) = if tag.content.contains('选') {
                let (a, b) = capture_pair(&BUNDLE, &tag.content);
                (a, b, a / b / price)
            } else {
                let (a, b) = capture_pair(&SPEND, &digits_and_yuan(spend_clause(&tag.content)));
                (a, b, (a - b) / a)
            };
            TagDiscount {
                factor: usable(factor),
                annotation: format!("<!--a={a:.6},b={b:.6}-->"),
            }
        }
        CODE_BULK => {
            let tenths = tag
                .content
                .rfind('打')
                .and_then(|n| BULK.captures(&tag.content[n..]))
                .and_then(|caps| caps[1].parse::<f64>().ok())
                .unwrap_or(0.0);
            TagDiscount {
                factor: usable(tenths / 10.0),
                annotation: String::new(),
            }
        }
        _ => TagDiscount {
            factor: None,
            annotation: String::new(),
        },
    }
}

fn usable(factor: f64) -> Option<f64> {
    (factor != 0.0 && factor.is_finite()).then_some(factor)
}

/// Leading number pair; a missing second number reads as 0 and the first
/// one is kept.
fn capture_pair(re: &Regex, text: &str) -> (f64, f64) {
    let Some(caps) = re.captures(text) else {
        return (0.0, 0.0);
    };
    let number = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    (number(1), number(2))
}

/// Drops a trailing "最多..." cap and anything before the last "满".
fn spend_clause(content: &str) -> &str {
    let capped = content.rfind("最多").map_or(content, |n| &content[..n]);
    capped.rfind('满').map_or(capped, |n| &capped[n..])
}

fn digits_and_yuan(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '元')
        .collect()
}

pub(crate) fn tag_line(tag: &PromotionTag, item_base: &str) -> String {
    if !tag.gifts.is_empty() {
        tag.gifts
            .iter()
            .map(|gift| {
                format!(
                    "【{}】<a href='{item_base}/{}.html' target='_blank'>{}</a>X{}{}",
                    tag.name, gift.sid, gift.nm, gift.num, tag.content
                )
            })
            .collect()
    } else if !tag.adurl.is_empty() {
        format!(
            "【{}】<a href='{}' target='_blank'>{}</a>",
            tag.name, tag.adurl, tag.content
        )
    } else {
        format!("【{}】{}", tag.name, tag.content)
    }
}
