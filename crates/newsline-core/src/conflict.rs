//! Conflict resolution between items that share an identity key.
//!
//! # Tie-Breaking Chain
//!
//! Given the running survivor `a` and a later candidate `b`:
//!
//! 1. **Publication time**: the strictly newer `published_utc` wins
//!    (missing or unparsable counts as epoch 0).
//! 2. **Aggregator**: if exactly one side is a syndication/aggregator
//!    source, the other side wins.
//! 3. **Paywall**: the non-paywalled side wins.
//! 4. **Lexical identity**: smaller `source`, then smaller link, then
//!    smaller `title` wins. This makes the outcome independent of feed order.
//! 5. **First seen**: items equal on all of the above keep `a`.
//!
//! The chain is a total preorder, so folding a group left-to-right gives the
//! same survivor for every permutation of the group.

use crate::config::ConflictConfig;
use crate::model::RawItem;
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Case-insensitive substrings that mark a source or link as an aggregator
/// or press-release wire rather than an original publisher.
pub const DEFAULT_AGGREGATOR_SIGNATURES: &[&str] = &[
    // aggregators by name
    "google news",
    "yahoo news",
    "apple news",
    "msn news",
    "flipboard",
    "news aggregator",
    // aggregator and feed-proxy domains
    "news.google.",
    "news.yahoo.",
    "apple.news",
    "news.msn.com",
    "feedproxy.",
    "feedburner.",
    // press-release wires
    "globenewswire",
    "newswire.ca",
    "prnewswire",
    "businesswire",
    "accesswire",
    "/globe-newswire",
    "/business-wire",
    "/newswire/",
];

/// Chooses the surviving representative among colliding items.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    signatures: Vec<String>,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(&ConflictConfig::default())
    }
}

impl ConflictResolver {
    /// Build a resolver from the built-in signatures plus configured extras.
    #[must_use]
    pub fn new(config: &ConflictConfig) -> Self {
        let signatures = DEFAULT_AGGREGATOR_SIGNATURES
            .iter()
            .map(|sig| (*sig).to_string())
            .chain(
                config
                    .extra_aggregator_signatures
                    .iter()
                    .map(|sig| sig.trim().to_lowercase()),
            )
            .filter(|sig| !sig.is_empty())
            .collect();
        Self { signatures }
    }

    /// Returns `true` if the item's source or links match an aggregator
    /// signature.
    #[must_use]
    pub fn is_aggregator(&self, item: &RawItem) -> bool {
        let fields = [
            item.source.as_deref(),
            item.url.as_deref(),
            item.canonical_url.as_deref(),
        ];
        fields.into_iter().flatten().any(|field| {
            let field = field.to_lowercase();
            self.signatures.iter().any(|sig| field.contains(sig.as_str()))
        })
    }

    /// Compare two colliding items; `Greater` means `a` is the better one.
    #[must_use]
    pub fn compare(&self, a: &RawItem, b: &RawItem) -> Ordering {
        // Step 1: newer wins
        a.published_millis()
            .cmp(&b.published_millis())
            // Step 2: non-aggregator wins
            .then_with(|| self.is_aggregator(b).cmp(&self.is_aggregator(a)))
            // Step 3: non-paywalled wins
            .then_with(|| b.paywall.cmp(&a.paywall))
            // Step 4: lexically smaller identity wins
            .then_with(|| b.source.cmp(&a.source))
            .then_with(|| b.link().cmp(&a.link()))
            .then_with(|| b.title.cmp(&a.title))
    }

    /// Keep the better of two items sharing a key. Ties keep `a`.
    #[must_use]
    pub fn choose(&self, a: RawItem, b: RawItem) -> RawItem {
        if self.compare(&a, &b) == Ordering::Less {
            b
        } else {
            a
        }
    }

    /// Fold a group of colliding items to one survivor, left to right.
    ///
    /// Returns `None` only for an empty group.
    pub fn reduce<I>(&self, group: I) -> Option<RawItem>
    where
        I: IntoIterator<Item = RawItem>,
    {
        group.into_iter().reduce(|best, next| self.choose(best, next))
    }
}

/// Keep the better of two items using the built-in signatures.
#[must_use]
pub fn choose(a: RawItem, b: RawItem) -> RawItem {
    static DEFAULT: OnceLock<ConflictResolver> = OnceLock::new();
    DEFAULT.get_or_init(ConflictResolver::default).choose(a, b)
}
