//! Identity resolution: deciding when two raw items denote the same story.
//!
//! Every [`RawItem`] maps to exactly one [`IdentityKey`]. The first non-empty
//! signal wins, strongest first:
//!
//! 1. `cluster_id` → `c:<cluster_id>`
//! 2. `canonical_id` → `i:<canonical_id>`
//! 3. `canonical_url` → `u:<normalized url>`
//! 4. `url` → `u:<normalized url>`
//! 5. title → `t:<sorted signature tokens>`
//!
//! Titles that reduce to nothing but stop words fall back to `r:<raw tokens>`,
//! and items with no usable signal at all share [`PLACEHOLDER_KEY`].
//!
//! Resolution is pure: the same item and configuration always produce the
//! same key.

use crate::config::IdentityConfig;
use crate::model::{RawItem, non_empty};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::{LazyLock, OnceLock};
use url::Url;

/// Shared key for items with no id, no URL and no title tokens.
pub const PLACEHOLDER_KEY: &str = "x:untitled";

/// Separator between signature tokens.
const TOKEN_SEPARATOR: &str = "|";

/// Built-in title stop words: articles, prepositions, news boilerplate,
/// place-name fragments that merge unrelated stories, and sports filler.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    // articles, conjunctions, prepositions
    "the", "a", "an", "and", "or", "but", "of", "for", "with", "without", "in", "on", "at", "to",
    "from", "by", "as", "into", "over", "under", "than", "about", "after", "before", "due",
    // auxiliaries and pronouns
    "will", "still", "just", "not", "is", "are", "was", "were", "be", "being", "been", "it",
    "its", "this", "that", "these", "those",
    // news boilerplate
    "live", "update", "updates", "breaking", "video", "photos", "report", "reports", "says",
    "say", "said",
    // sports boilerplate
    "vs", "game", "games", "preview", "recap", "season", "start", "starts", "starting",
    "lineup",
    // casualty wording shared by unrelated incidents
    "dead", "killed", "kills", "kill", "dies", "die", "injured", "injures", "injury",
    // place-name fragments
    "los", "angeles", "new", "york", "la",
];

/// A trailing ` - Publisher` / ` – Publisher` tail.
static PUBLISHER_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+[-\u{2013}\u{2014}]\s+[^|]*$").expect("publisher tail pattern is valid")
});

/// A leading URL scheme with authority marker.
static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)[a-z][a-z0-9+.\-]*://").expect("url scheme pattern is valid")
});

// ---------------------------------------------------------------------------
// IdentityKey
// ---------------------------------------------------------------------------

/// Derived identity of a story. Equal keys mean "same story".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdentityKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for IdentityKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// Which signal produced a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    ClusterId,
    CanonicalId,
    CanonicalUrl,
    Url,
    TitleSignature,
    RawTitle,
    Placeholder,
}

impl KeySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClusterId => "cluster_id",
            Self::CanonicalId => "canonical_id",
            Self::CanonicalUrl => "canonical_url",
            Self::Url => "url",
            Self::TitleSignature => "title_signature",
            Self::RawTitle => "raw_title",
            Self::Placeholder => "placeholder",
        }
    }
}

// ---------------------------------------------------------------------------
// IdentityResolver
// ---------------------------------------------------------------------------

/// Resolves identity keys with a fixed stop-word table and token limits.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    stop_words: HashSet<String>,
    max_title_tokens: usize,
    fallback_token_limit: usize,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(&IdentityConfig::default())
    }
}

impl IdentityResolver {
    /// Build a resolver from the built-in stop words plus configured extras.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let stop_words = DEFAULT_STOP_WORDS
            .iter()
            .map(|word| (*word).to_string())
            .chain(
                config
                    .extra_stop_words
                    .iter()
                    .map(|word| word.trim().to_lowercase()),
            )
            .filter(|word| !word.is_empty())
            .collect();

        Self {
            stop_words,
            max_title_tokens: config.max_title_tokens.max(1),
            fallback_token_limit: config.fallback_token_limit.max(1),
        }
    }

    /// Identity key for one item.
    #[must_use]
    pub fn resolve(&self, item: &RawItem) -> IdentityKey {
        self.resolve_explained(item).0
    }

    /// Identity key together with the signal that produced it.
    #[must_use]
    pub fn resolve_explained(&self, item: &RawItem) -> (IdentityKey, KeySource) {
        if let Some(cluster) = non_empty(item.cluster_id.as_deref()) {
            return (IdentityKey(format!("c:{cluster}")), KeySource::ClusterId);
        }
        if let Some(id) = non_empty(item.canonical_id.as_deref()) {
            return (IdentityKey(format!("i:{id}")), KeySource::CanonicalId);
        }
        if let Some(url) = non_empty(item.canonical_url.as_deref()) {
            return (
                IdentityKey(format!("u:{}", normalize_url(url))),
                KeySource::CanonicalUrl,
            );
        }
        if let Some(url) = non_empty(item.url.as_deref()) {
            return (
                IdentityKey(format!("u:{}", normalize_url(url))),
                KeySource::Url,
            );
        }
        self.title_key(item.title.as_deref().unwrap_or_default())
    }

    /// Signature key for a bare title.
    fn title_key(&self, title: &str) -> (IdentityKey, KeySource) {
        let stripped = strip_publisher_tail(title).to_lowercase();
        let raw_tokens = tokenize(&stripped);

        let signature: BTreeSet<&str> = raw_tokens
            .iter()
            .map(String::as_str)
            .filter(|token| token.chars().count() > 1 && !self.stop_words.contains(*token))
            .collect();

        if !signature.is_empty() {
            let joined = signature
                .into_iter()
                .take(self.max_title_tokens)
                .collect::<Vec<_>>()
                .join(TOKEN_SEPARATOR);
            return (IdentityKey(format!("t:{joined}")), KeySource::TitleSignature);
        }

        // Every token was filtered. Keep the unfiltered sequence so that
        // different stop-word-only titles do not collapse into one bucket.
        let raw_tokens = if raw_tokens.is_empty() {
            tokenize(&title.to_lowercase())
        } else {
            raw_tokens
        };
        if raw_tokens.is_empty() {
            return (IdentityKey(PLACEHOLDER_KEY.to_string()), KeySource::Placeholder);
        }
        let joined = raw_tokens
            .iter()
            .take(self.fallback_token_limit)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(TOKEN_SEPARATOR);
        (IdentityKey(format!("r:{joined}")), KeySource::RawTitle)
    }
}

/// Identity key using the built-in configuration.
#[must_use]
pub fn resolve(item: &RawItem) -> IdentityKey {
    static DEFAULT: OnceLock<IdentityResolver> = OnceLock::new();
    DEFAULT.get_or_init(IdentityResolver::default).resolve(item)
}

// ---------------------------------------------------------------------------
// Title helpers
// ---------------------------------------------------------------------------

/// Drop a trailing ` - Publisher` tail (any dash variant, no `|` after it).
#[must_use]
pub fn strip_publisher_tail(title: &str) -> &str {
    PUBLISHER_TAIL
        .find(title)
        .map_or(title, |tail| &title[..tail.start()])
}

/// Maximal runs of letters and digits, in order.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// URL normalization
// ---------------------------------------------------------------------------

/// Reduce a link to `host + path`, folding away scheme, query, fragment,
/// letter case, leading mobile subdomains, and trailing slashes.
///
/// Unparsable input takes a string-based path through the same host/path
/// rules, so the result is stable under re-normalization.
#[must_use]
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) if !host.is_empty() => join_host_path(host, parsed.path()),
            _ => normalize_url_text(raw),
        },
        Err(_) => normalize_url_text(raw),
    }
}

fn normalize_url_text(raw: &str) -> String {
    let without_scheme = URL_SCHEME.replace(raw, "");
    let without_scheme = without_scheme.trim_start_matches('/');
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    let trimmed = &without_scheme[..end];
    match trimmed.find('/') {
        Some(slash) => join_host_path(&trimmed[..slash], &trimmed[slash..]),
        None => join_host_path(trimmed, "/"),
    }
}

fn join_host_path(host: &str, path: &str) -> String {
    let host = host.to_lowercase();
    let host = strip_mobile_label(&host);
    let mut path = if path.is_empty() {
        "/".to_string()
    } else {
        path.to_lowercase()
    };
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    format!("{host}{path}")
}

/// `m.m.example.com` → `example.com`; `m.com` stays as is.
fn strip_mobile_label(mut host: &str) -> &str {
    'strip: loop {
        for prefix in ["m.", "mobile."] {
            if let Some(rest) = host.strip_prefix(prefix)
                && rest.contains('.')
            {
                host = rest;
                continue 'strip;
            }
        }
        return host;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> RawItem {
        RawItem {
            title: Some(title.to_string()),
            ..RawItem::default()
        }
    }

    // ── priority ───────────────────────────────────────────────────────────

    #[test]
    fn cluster_id_outranks_everything() {
        let both = RawItem {
            cluster_id: Some("X".into()),
            canonical_url: Some("https://a.com/b".into()),
            title: Some("Anything".into()),
            ..RawItem::default()
        };
        let cluster_only = RawItem {
            cluster_id: Some("X".into()),
            ..RawItem::default()
        };
        let url_only = RawItem {
            canonical_url: Some("https://a.com/b".into()),
            ..RawItem::default()
        };
        assert_eq!(resolve(&both), resolve(&cluster_only));
        assert_ne!(resolve(&both), resolve(&url_only));
        assert_eq!(resolve(&both).as_str(), "c:X");
        assert_eq!(resolve(&url_only).as_str(), "u:a.com/b");
    }

    #[test]
    fn canonical_id_outranks_urls() {
        let item = RawItem {
            canonical_id: Some("u:abc123".into()),
            url: Some("https://a.com/b".into()),
            ..RawItem::default()
        };
        let (key, source) = IdentityResolver::default().resolve_explained(&item);
        assert_eq!(key.as_str(), "i:u:abc123");
        assert_eq!(source, KeySource::CanonicalId);
    }

    #[test]
    fn canonical_url_outranks_url() {
        let item = RawItem {
            canonical_url: Some("https://example.com/story".into()),
            url: Some("https://tracker.example.net/r?id=1".into()),
            ..RawItem::default()
        };
        assert_eq!(resolve(&item).as_str(), "u:example.com/story");
    }

    #[test]
    fn blank_signals_are_skipped() {
        let item = RawItem {
            cluster_id: Some("   ".into()),
            canonical_id: Some(String::new()),
            url: Some("https://example.com/a".into()),
            ..RawItem::default()
        };
        assert_eq!(resolve(&item).as_str(), "u:example.com/a");
    }

    // ── URLs ───────────────────────────────────────────────────────────────

    #[test]
    fn url_variants_collapse() {
        let expected = "example.com/story";
        for raw in [
            "https://M.Example.com/Story/",
            "https://example.com/story",
            "http://mobile.example.com/story?utm_source=x#top",
            "HTTPS://EXAMPLE.COM:443/STORY/",
            "example.com/story/",
        ] {
            assert_eq!(normalize_url(raw), expected, "input {raw}");
        }
    }

    #[test]
    fn root_path_keeps_its_slash() {
        assert_eq!(normalize_url("https://example.com"), "example.com/");
        assert_eq!(normalize_url("https://example.com/"), "example.com/");
        assert_eq!(normalize_url("example.com"), "example.com/");
    }

    #[test]
    fn bare_mobile_host_is_not_stripped() {
        assert_eq!(normalize_url("https://m.com/a"), "m.com/a");
        assert_eq!(normalize_url("https://m.news.example/a"), "news.example/a");
    }

    #[test]
    fn stacked_mobile_labels_and_slashes_fold_in_one_pass() {
        for raw in [
            "https://m.m.example.com/a",
            "https://m.mobile.example.com/a//",
            "mobile.m.example.com/a/",
        ] {
            let once = normalize_url(raw);
            assert_eq!(once, "example.com/a", "input {raw}");
            assert_eq!(normalize_url(&once), once);
        }
        assert_eq!(normalize_url("https://m.m.com/a"), "m.com/a");
    }

    #[test]
    fn unparsable_url_uses_text_fallback() {
        assert_eq!(
            normalize_url("https://exa mple.com/Path/?q=1"),
            "exa mple.com/path"
        );
        assert_eq!(normalize_url("//cdn.example.com/x#frag"), "cdn.example.com/x");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "https://M.Example.com/Story/",
            "https://exa mple.com/a/",
            "news.example.org/world/",
            "https://example.com",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "input {raw}");
        }
    }

    // ── titles ─────────────────────────────────────────────────────────────

    #[test]
    fn publisher_tail_is_stripped() {
        assert_eq!(
            strip_publisher_tail("Storm Hits Region - Example.com"),
            "Storm Hits Region"
        );
        assert_eq!(
            strip_publisher_tail("Storm Hits Region \u{2013} The Paper"),
            "Storm Hits Region"
        );
        assert_eq!(strip_publisher_tail("Left-right split"), "Left-right split");
        assert_eq!(
            strip_publisher_tail("A - B | Section"),
            "A - B | Section",
            "a tail containing `|` is not a publisher tail"
        );
    }

    #[test]
    fn title_signature_ignores_order_case_and_publisher() {
        let a = resolve(&titled("Storm Hits Region - Example.com"));
        let b = resolve(&titled("region: storm HITS"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "t:hits|region|storm");
    }

    #[test]
    fn stop_words_and_single_chars_are_dropped() {
        let key = resolve(&titled("BREAKING: The Leafs vs. Bruins game recap, a 4-3 win"));
        assert_eq!(key.as_str(), "t:bruins|leafs|win");
    }

    #[test]
    fn signature_keeps_at_most_twelve_tokens() {
        let title = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima mike november";
        let key = resolve(&titled(title));
        let tokens: Vec<&str> = key
            .as_str()
            .trim_start_matches("t:")
            .split('|')
            .collect();
        assert_eq!(tokens.len(), 12);
        assert_eq!(tokens.first(), Some(&"alpha"));
        assert_eq!(tokens.last(), Some(&"lima"));
    }

    #[test]
    fn all_stop_word_titles_use_raw_tokens() {
        let a = resolve(&titled("Live: The Update"));
        let b = resolve(&titled("Breaking report"));
        assert_eq!(a.as_str(), "r:live|the|update");
        assert_eq!(b.as_str(), "r:breaking|report");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_item_uses_placeholder() {
        assert_eq!(resolve(&RawItem::default()).as_str(), PLACEHOLDER_KEY);
        assert_eq!(resolve(&titled("  !!! ")).as_str(), PLACEHOLDER_KEY);
    }

    #[test]
    fn configured_stop_words_extend_defaults() {
        let resolver = IdentityResolver::new(&IdentityConfig {
            extra_stop_words: vec!["Toronto".into()],
            ..IdentityConfig::default()
        });
        let key = resolver.resolve(&titled("Toronto transit strike"));
        assert_eq!(key.as_str(), "t:strike|transit");
    }
}
