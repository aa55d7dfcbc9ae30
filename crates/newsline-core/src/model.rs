//! Feed item types shared by every stage of the ordering pipeline.
//!
//! [`RawItem`] is what the upstream build step writes; [`OrderedItem`] is what
//! the renderer receives. Optional fields are `None` when the producer left
//! them out or wrote `null`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Numbers at or above this magnitude are read as epoch milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// A publication timestamp as it appears in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Published {
    /// Numeric epoch (seconds, or milliseconds for large values).
    Epoch(f64),
    /// ISO-8601 / RFC 3339 (or RFC 2822) text.
    Text(String),
}

impl Published {
    /// Milliseconds since the Unix epoch, or `None` when unparsable.
    #[must_use]
    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            Self::Epoch(n) if n.is_finite() => {
                let millis = if n.abs() >= EPOCH_MILLIS_THRESHOLD {
                    *n
                } else {
                    n * 1000.0
                };
                #[allow(clippy::cast_possible_truncation)]
                let millis = millis.round() as i64;
                Some(millis)
            }
            Self::Epoch(_) => None,
            Self::Text(raw) => parse_timestamp(raw).map(|ts| ts.timestamp_millis()),
        }
    }
}

/// Parse the timestamp shapes that feed producers emit.
///
/// Naive date-times carry no offset and are read as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// One candidate story from the upstream feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_utc: Option<Published>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub paywall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

impl RawItem {
    /// Publication time in epoch milliseconds; unknown or unparsable is `0`.
    #[must_use]
    pub fn published_millis(&self) -> i64 {
        self.published_utc
            .as_ref()
            .and_then(Published::epoch_millis)
            .unwrap_or(0)
    }

    /// The preferred outbound link: `canonical_url`, else `url`.
    #[must_use]
    pub fn link(&self) -> Option<&str> {
        non_empty(self.canonical_url.as_deref()).or_else(|| non_empty(self.url.as_deref()))
    }
}

/// Trimmed value when present and non-blank.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A surviving item with the first-seen sequence it was sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedItem {
    #[serde(flatten)]
    pub item: RawItem,
    pub sequence: u64,
}

/// A feed as written by the upstream build step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Build stamp of the snapshot, used to skip unchanged refreshes.
    pub generated_utc: Option<String>,
    pub items: Vec<RawItem>,
}

impl FeedSnapshot {
    /// Parse either `{"generated_utc": .., "items": [..]}` or a bare array.
    ///
    /// Entries that are not objects, or whose fields have the wrong types, are
    /// skipped so one bad record cannot block the rest of the feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, or is JSON of neither shape.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        let (generated_utc, entries) = match value {
            Value::Array(entries) => (None, entries),
            Value::Object(mut map) => {
                let generated_utc = map
                    .get("generated_utc")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match map.remove("items") {
                    Some(Value::Array(entries)) => (generated_utc, entries),
                    _ => {
                        return Err(serde::de::Error::custom(
                            "feed object has no `items` array",
                        ));
                    }
                }
            }
            _ => {
                return Err(serde::de::Error::custom(
                    "feed must be an array or an object with `items`",
                ));
            }
        };

        let mut items = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            if !entry.is_object() {
                warn!(index, "skipping feed entry that is not an object");
                continue;
            }
            match serde_json::from_value::<RawItem>(entry) {
                Ok(item) => items.push(item),
                Err(err) => warn!(index, "skipping malformed feed entry: {err}"),
            }
        }

        Ok(Self {
            generated_utc,
            items,
        })
    }
}

/// The ordered feed handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedFeed {
    pub generated_utc: String,
    pub count: usize,
    pub items: Vec<OrderedItem>,
}

impl OrderedFeed {
    /// Wrap ordered items, passing the snapshot stamp through when present.
    #[must_use]
    pub fn new(generated_utc: Option<String>, items: Vec<OrderedItem>) -> Self {
        let generated_utc = generated_utc.unwrap_or_else(|| Utc::now().to_rfc3339());
        Self {
            generated_utc,
            count: items.len(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_and_naive_timestamps_agree() {
        let zulu = Published::Text("2024-01-01T00:05:00Z".into());
        let naive = Published::Text("2024-01-01T00:05:00".into());
        let offset = Published::Text("2024-01-01T01:05:00+01:00".into());
        assert_eq!(zulu.epoch_millis(), Some(1_704_067_500_000));
        assert_eq!(naive.epoch_millis(), zulu.epoch_millis());
        assert_eq!(offset.epoch_millis(), zulu.epoch_millis());
    }

    #[test]
    fn rfc2822_timestamps_parse() {
        let ts = Published::Text("Mon, 01 Jan 2024 00:05:00 +0000".into());
        assert_eq!(ts.epoch_millis(), Some(1_704_067_500_000));
    }

    #[test]
    fn numeric_epochs_accept_seconds_and_millis() {
        assert_eq!(
            Published::Epoch(1_704_067_500.0).epoch_millis(),
            Some(1_704_067_500_000)
        );
        assert_eq!(
            Published::Epoch(1_704_067_500_000.0).epoch_millis(),
            Some(1_704_067_500_000)
        );
        assert_eq!(Published::Epoch(f64::NAN).epoch_millis(), None);
    }

    #[test]
    fn missing_or_garbage_timestamp_is_zero() {
        let missing = RawItem::default();
        assert_eq!(missing.published_millis(), 0);

        let garbage = RawItem {
            published_utc: Some(Published::Text("yesterday-ish".into())),
            ..RawItem::default()
        };
        assert_eq!(garbage.published_millis(), 0);
    }

    #[test]
    fn raw_item_treats_null_as_absent() {
        let item: RawItem = serde_json::from_str(
            r#"{"title":"Hello","url":null,"paywall":null,"published_utc":1700000000}"#,
        )
        .expect("item should parse");
        assert_eq!(item.title.as_deref(), Some("Hello"));
        assert!(item.url.is_none());
        assert!(!item.paywall);
        assert_eq!(item.published_millis(), 1_700_000_000_000);
    }

    #[test]
    fn link_prefers_canonical_url() {
        let item = RawItem {
            url: Some("https://a.example/x".into()),
            canonical_url: Some("  ".into()),
            ..RawItem::default()
        };
        assert_eq!(item.link(), Some("https://a.example/x"));

        let item = RawItem {
            canonical_url: Some("https://b.example/y".into()),
            ..item
        };
        assert_eq!(item.link(), Some("https://b.example/y"));
    }

    #[test]
    fn snapshot_accepts_envelope_and_bare_array() {
        let wrapped = FeedSnapshot::from_json(
            r#"{"generated_utc":"2024-01-01T00:00:00Z","count":1,"items":[{"title":"A"}]}"#,
        )
        .expect("envelope should parse");
        assert_eq!(
            wrapped.generated_utc.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(wrapped.items.len(), 1);

        let bare = FeedSnapshot::from_json(r#"[{"title":"A"},{"title":"B"}]"#)
            .expect("array should parse");
        assert!(bare.generated_utc.is_none());
        assert_eq!(bare.items.len(), 2);
    }

    #[test]
    fn snapshot_skips_malformed_entries() {
        let snap = FeedSnapshot::from_json(r#"[{"title":"A"}, 42, "x", {"title": 7}, {"url":"u"}]"#)
            .expect("array should parse");
        assert_eq!(snap.items.len(), 2);
        assert_eq!(snap.items[1].url.as_deref(), Some("u"));
    }

    #[test]
    fn snapshot_rejects_other_shapes() {
        assert!(FeedSnapshot::from_json("{not json").is_err());
        assert!(FeedSnapshot::from_json(r#"{"entries":[]}"#).is_err());
        assert!(FeedSnapshot::from_json("12").is_err());
    }

    #[test]
    fn ordered_item_serializes_flat_with_sequence() {
        let ordered = OrderedItem {
            item: RawItem {
                title: Some("A".into()),
                ..RawItem::default()
            },
            sequence: 3,
        };
        let json = serde_json::to_value(&ordered).expect("serialize");
        assert_eq!(json["title"], "A");
        assert_eq!(json["sequence"], 3);
        assert_eq!(json["paywall"], false);
    }
}
