//! Post rendering: HTML-sanitized captions and the inline keyboard.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Url;
use tracing::warn;

use crate::model::{Keyboard, LinkButton, Product};

pub const BUY_LABEL: &str = "КУПИТЬ";
pub const MANAGER_LABEL: &str = "НАПИСАТЬ МЕНЕДЖЕРУ";
const CAPTION_PREFIX: &str = "🛒";

static PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?p\b[^>]*>").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").unwrap());
// kept bold tags and entities Telegram understands, or a bare special char
static TEXT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"</?b>|&(?:lt|gt|amp|quot|#[0-9]+|#[xX][0-9a-fA-F]+);|[&<>]").unwrap()
});

/// Strip every tag except `<b>`; paragraphs and `<br>` become newlines.
/// Leftover `<`, `>` and `&` are escaped so the result is valid Telegram HTML.
pub fn clean_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = PARAGRAPH.replace_all(text, "\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, |caps: &Captures| {
        if caps[2].eq_ignore_ascii_case("b") {
            format!("<{}b>", &caps[1])
        } else {
            String::new()
        }
    });
    let text = TEXT_TOKEN.replace_all(&text, |caps: &Captures| match &caps[0] {
        "&" => "&amp;".to_string(),
        "<" => "&lt;".to_string(),
        ">" => "&gt;".to_string(),
        kept => kept.to_string(),
    });
    text.trim().to_string()
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn build_caption(product: &Product) -> String {
    let description = clean_html(product.description.as_deref().unwrap_or_default());
    format!(
        "{} <b>{}</b>\n\n{}",
        CAPTION_PREFIX,
        escape_html(product.name.trim()),
        description
    )
}

/// Optional "buy" row for the product page, then the fixed manager row.
pub fn build_keyboard(product_url: Option<&str>, manager_url: &str) -> Keyboard {
    let mut rows = Vec::with_capacity(2);
    if let Some(url) = product_url.map(str::trim).filter(|u| !u.is_empty()) {
        if Url::parse(url).is_ok() {
            rows.push(vec![LinkButton {
                text: BUY_LABEL.to_string(),
                url: url.to_string(),
            }]);
        } else {
            warn!(url, "product url is not absolute; omitting buy button");
        }
    }
    rows.push(vec![LinkButton {
        text: MANAGER_LABEL.to_string(),
        url: manager_url.to_string(),
    }]);
    Keyboard { rows }
}
