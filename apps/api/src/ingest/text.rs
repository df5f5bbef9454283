use once_cell::sync::Lazy;
use regex::Regex;

static RE_BLOCK_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr|hr)\b[^>]*>").expect("valid block-tag regex")
});
static RE_SCRIPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b.*?</(script|style)\s*>").expect("valid script regex")
});
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)</?[^>]+>").expect("valid tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Turns a provider's HTML description into plain text.
///
/// Tags are stripped before entities are decoded, so an escaped `&lt;b&gt;` survives as
/// literal text instead of being treated as markup.
pub fn clean_description(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let out = RE_SCRIPT.replace_all(raw, " ");
    let out = RE_BLOCK_TAGS.replace_all(&out, " ");
    let out = RE_TAGS.replace_all(&out, "");
    let out = html_escape::decode_html_entities(&out);
    // &nbsp; decodes to U+00A0, which `\s` already matches.
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// Local query filter for providers whose API has no search parameter.
/// Every whitespace-separated query token must appear in at least one field.
pub fn matches_query<'a>(query: &str, fields: impl IntoIterator<Item = &'a str>) -> bool {
    let haystack = fields
        .into_iter()
        .map(str::to_lowercase)
        .collect::<Vec<_>>();

    query
        .split_whitespace()
        .map(str::to_lowercase)
        .all(|token| haystack.iter().any(|field| field.contains(&token)))
}
