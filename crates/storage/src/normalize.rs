//! Item normalization.
//!
//! The listing endpoint has changed shape more than once (S3 object dumps,
//! hand-built dataset records, ...), so a record may name the same attribute in
//! several ways. Every lookup goes through one alias table with a fixed
//! precedence; nothing downstream of [`normalize`] ever looks at raw fields.
//!
//! | Attribute   | Aliases (highest priority first)                                   |
//! |-------------|--------------------------------------------------------------------|
//! | key         | `key`, `Key`, `id`, `path`, `name`                                 |
//! | dataset id  | `id`, `dataset_id`, `datasetId`                                    |
//! | name        | `name`, `Name`, `filename`, `fileName` (else last key segment)     |
//! | kind        | `type`, `format`, then `contentType`, `content_type`, `ContentType`|
//! | modified    | `uploaded`, `uploadedAt`, `uploaded_at`, `lastModified`, ...       |
//! | download    | `downloadUrl`, `download_url`, `url`                               |
//! | size        | `size`, `Size`, `ContentLength`                                    |

use crate::models::{Kind, RawItem, RemoteItem};
use serde_json::Value;
use std::collections::HashSet;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{Date, OffsetDateTime, PrimitiveDateTime};

const KEY_ALIASES: &[&str] = &["key", "Key", "id", "path", "name"];
const DATASET_ID_ALIASES: &[&str] = &["id", "dataset_id", "datasetId"];
const NAME_ALIASES: &[&str] = &["name", "Name", "filename", "fileName"];
const TYPE_ALIASES: &[&str] = &["type", "format"];
const CONTENT_TYPE_ALIASES: &[&str] = &["contentType", "content_type", "ContentType"];
const MODIFIED_ALIASES: &[&str] = &[
    "uploaded",
    "uploadedAt",
    "uploaded_at",
    "lastModified",
    "LastModified",
    "last_modified",
    "createdAt",
    "created_at",
    "creationDate",
    "CreationDate",
];
const DOWNLOAD_ALIASES: &[&str] = &["downloadUrl", "download_url", "url"];
const SIZE_ALIASES: &[&str] = &["size", "Size", "ContentLength"];

/// Normalize one listing record.
///
/// Returns `None` when the record carries nothing usable as an identity.
pub fn normalize(raw: &RawItem) -> Option<RemoteItem> {
    let key = text(raw, KEY_ALIASES)?;
    let name = text(raw, NAME_ALIASES).unwrap_or_else(|| name_from_key(&key));
    let kind = text(raw, TYPE_ALIASES)
        .or_else(|| text(raw, CONTENT_TYPE_ALIASES))
        .map(|declared| declared_kind(&declared))
        .unwrap_or_else(|| kind_from_name(&key, &name));
    let dataset_id = text(raw, DATASET_ID_ALIASES).filter(|id| *id != key);
    Some(RemoteItem {
        dataset_id,
        name,
        kind,
        modified: modified(raw),
        download_url: text(raw, DOWNLOAD_ALIASES),
        size: SIZE_ALIASES.iter().find_map(|alias| raw.field(alias)).and_then(Value::as_u64),
        key,
    })
}

/// Normalize a whole listing, preserving order.
///
/// Records without an identity are dropped, and so are later records whose
/// key was already seen: keys are unique within one snapshot.
pub fn normalize_all(raws: impl IntoIterator<Item = RawItem>) -> Vec<RemoteItem> {
    let mut seen = HashSet::new();
    raws.into_iter()
        .filter_map(|raw| {
            let item = normalize(&raw);
            if item.is_none() {
                tracing::warn!(fields = ?raw.fields().keys().collect::<Vec<_>>(), "Skipping listing record without an identity");
            }
            item
        })
        .filter(|item| {
            let fresh = seen.insert(item.key.clone());
            if !fresh {
                tracing::warn!(key = %item.key, "Skipping duplicate key in listing");
            }
            fresh
        })
        .collect()
}

/// First alias holding a non-empty string (or a number, rendered as one).
///
/// Empty strings fall through to the next alias.
fn text(raw: &RawItem, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match raw.field(alias)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Only the first present (non-null) timestamp alias is considered; if it
/// doesn't parse the item simply has no timestamp.
fn modified(raw: &RawItem) -> Option<OffsetDateTime> {
    MODIFIED_ALIASES.iter().find_map(|alias| raw.field(alias)).and_then(parse_timestamp)
}

pub(crate) fn name_from_key(key: &str) -> String {
    key.split('/').filter(|segment| !segment.is_empty()).next_back().unwrap_or(key).to_string()
}

/// Derive the kind from a name's extension.
///
/// A name without an extension (where the "extension" would be the whole
/// lowercase name) is a folder, as is any key ending in `/`.
pub(crate) fn kind_from_name(key: &str, name: &str) -> Kind {
    if key.ends_with('/') {
        return Kind::Folder;
    }
    let lowered = name.to_lowercase();
    match lowered.rsplit('.').next() {
        Some(ext) if !ext.is_empty() && ext != lowered => Kind::File(ext.to_string()),
        _ => Kind::Folder,
    }
}

fn declared_kind(declared: &str) -> Kind {
    match declared.to_lowercase().as_str() {
        "folder" | "directory" | "dir" => Kind::Folder,
        other => Kind::File(other.to_string()),
    }
}

/// Parse a timestamp field: strings in any of the common ISO 8601 shapes,
/// numbers as Unix epoch milliseconds.
///
/// Strings that fail are retried once with the first space replaced by `T`
/// (`"2024-05-01 12:30:00"` → `"2024-05-01T12:30:00"`). Offset-less values
/// are taken as UTC.
pub fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            parse_datetime(s).or_else(|| match s.replacen(' ', "T", 1) {
                normalized if normalized != s => parse_datetime(&normalized),
                _ => None,
            })
        },
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
        },
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(s, &Iso8601::DEFAULT))
        .ok()
        .or_else(|| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).ok().map(PrimitiveDateTime::assume_utc))
        .or_else(|| Date::parse(s, &Iso8601::DEFAULT).ok().map(|d| d.midnight().assume_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use time::macros::datetime;

    fn raw(value: Value) -> RawItem {
        RawItem::from_value(value).unwrap()
    }

    #[test]
    fn test_backend_dataset_record() {
        let item = normalize(&raw(json!({
            "id": "sub/datasets/4f2a.pkl",
            "key": "sub/datasets/4f2a.pkl",
            "name": "4f2a.pkl",
            "format": "pkl",
            "uploadedAt": "2025-03-04T10:11:12+00:00",
            "downloadUrl": "https://bucket.example/4f2a.pkl?sig=x",
        })))
        .unwrap();
        assert_eq!(item.key, "sub/datasets/4f2a.pkl");
        assert_eq!(item.dataset_id, None, "id equal to the key is not repeated");
        assert_eq!(item.dataset_id(), "sub/datasets/4f2a.pkl");
        assert_eq!(item.name, "4f2a.pkl");
        assert_eq!(item.kind, Kind::File("pkl".to_string()));
        assert_eq!(item.modified, Some(datetime!(2025-03-04 10:11:12 UTC)));
        assert_eq!(item.download_url.as_deref(), Some("https://bucket.example/4f2a.pkl?sig=x"));
    }

    #[test]
    fn test_s3_object_record() {
        let item = normalize(&raw(json!({
            "Key": "sub/raw/Sales Q1.CSV",
            "LastModified": "2024-11-30 08:00:00",
            "Size": 2048,
        })))
        .unwrap();
        assert_eq!(item.key, "sub/raw/Sales Q1.CSV");
        assert_eq!(item.name, "Sales Q1.CSV");
        assert_eq!(item.kind, Kind::File("csv".to_string()));
        assert_eq!(item.modified, Some(datetime!(2024-11-30 08:00:00 UTC)));
        assert_eq!(item.size, Some(2048));
    }

    #[test]
    fn test_no_identity() {
        assert_eq!(normalize(&raw(json!({"uploadedAt": "2024-01-01", "name": ""}))), None);
    }

    #[rstest]
    #[case(json!({"key": "a/b/report.csv"}), Kind::File("csv".to_string()))]
    #[case(json!({"key": "a/b/README"}), Kind::Folder)]
    #[case(json!({"key": "a/b/v1.2/"}), Kind::Folder)]
    #[case(json!({"key": "trailing."}), Kind::Folder)]
    #[case(json!({"key": "x.bin", "contentType": "text/csv"}), Kind::File("text/csv".to_string()))]
    #[case(json!({"key": "x.bin", "contentType": "text/csv", "type": "CSV"}), Kind::File("csv".to_string()))]
    #[case(json!({"key": "x.bin", "type": "", "format": "pkl"}), Kind::File("pkl".to_string()))]
    #[case(json!({"key": "x", "type": "Folder"}), Kind::Folder)]
    fn test_kind_precedence(#[case] value: Value, #[case] expected: Kind) {
        assert_eq!(normalize(&raw(value)).unwrap().kind, expected);
    }

    #[test]
    fn test_kind_is_deterministic() {
        for name in ["a.csv", "A.CSV", "folder", "x.tar.gz"] {
            assert_eq!(kind_from_name(name, name), kind_from_name(name, name));
        }
        assert_eq!(kind_from_name("x.tar.gz", "x.tar.gz"), Kind::File("gz".to_string()));
    }

    #[rstest]
    #[case(json!({"key": "k", "uploaded": "2024-01-02T03:04:05Z", "createdAt": "1999-01-01"}), Some(datetime!(2024-01-02 03:04:05 UTC)))]
    #[case(json!({"key": "k", "uploaded": null, "created_at": "2024-01-02"}), Some(datetime!(2024-01-02 00:00:00 UTC)))]
    #[case(json!({"key": "k", "last_modified": "2024-01-02 03:04:05"}), Some(datetime!(2024-01-02 03:04:05 UTC)))]
    #[case(json!({"key": "k", "lastModified": "2024-01-02T03:04:05.250+02:00"}), Some(datetime!(2024-01-02 03:04:05.25 +02:00)))]
    #[case(json!({"key": "k", "CreationDate": 1_700_000_000_000_i64}), Some(datetime!(2023-11-14 22:13:20 UTC)))]
    // First present alias wins even when it is garbage; later aliases are not consulted.
    #[case(json!({"key": "k", "uploadedAt": "yesterday", "createdAt": "2024-01-02"}), None)]
    #[case(json!({"key": "k"}), None)]
    fn test_timestamp_precedence(#[case] value: Value, #[case] expected: Option<OffsetDateTime>) {
        assert_eq!(normalize(&raw(value)).unwrap().modified, expected);
    }

    #[test]
    fn test_normalize_all_keeps_order_and_first_duplicate() {
        let items = normalize_all(vec![
            raw(json!({"key": "z.csv"})),
            raw(json!({"nothing": true})),
            raw(json!({"key": "a.csv", "size": 1})),
            raw(json!({"key": "a.csv", "size": 2})),
        ]);
        let keys: Vec<_> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["z.csv", "a.csv"]);
        assert_eq!(items[1].size, Some(1));
    }

    #[test]
    fn test_name_from_key() {
        assert_eq!(name_from_key("sub/datasets/a.csv"), "a.csv");
        assert_eq!(name_from_key("sub/datasets/"), "datasets");
        assert_eq!(name_from_key("plain"), "plain");
    }
}
