//! Blob-reference extraction: walks a record's DAG-CBOR/JSON value looking
//! for `{"$type":"blob","ref":{"$link":cid},"mimeType":...,"size":...}`
//! subtrees, used to keep blob reference counts in sync with record writes.

use serde_json::Value;

/// A blob reference found embedded in a record value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBlobRef {
    pub cid: String,
    pub mime_type: String,
    pub size: u64,
}

/// Recursively collect every blob-reference subtree in `value`.
pub fn extract_blob_refs(value: &Value) -> Vec<ExtractedBlobRef> {
    let mut out = Vec::new();
    walk(value, &mut out);
    out
}

fn walk(value: &Value, out: &mut Vec<ExtractedBlobRef>) {
    match value {
        Value::Object(map) => {
            if let Some(blob_ref) = try_parse_blob_ref(map) {
                out.push(blob_ref);
                return;
            }
            for v in map.values() {
                walk(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, out);
            }
        }
        _ => {}
    }
}

fn try_parse_blob_ref(map: &serde_json::Map<String, Value>) -> Option<ExtractedBlobRef> {
    if map.get("$type")?.as_str()? != "blob" {
        return None;
    }
    let cid = map
        .get("ref")?
        .as_object()?
        .get("$link")?
        .as_str()?
        .to_string();
    let mime_type = map.get("mimeType")?.as_str()?.to_string();
    let size = map.get("size")?.as_u64()?;
    Some(ExtractedBlobRef { cid, mime_type, size })
}

/// Diff the blob references of an old and new record value, returning
/// `(added, removed)` CIDs to increment/decrement reference counts for.
/// A CID present in both is left untouched.
pub fn diff_blob_refs(old: Option<&Value>, new: Option<&Value>) -> (Vec<String>, Vec<String>) {
    let old_cids: std::collections::HashSet<String> = old
        .map(extract_blob_refs)
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.cid)
        .collect();
    let new_cids: std::collections::HashSet<String> = new
        .map(extract_blob_refs)
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.cid)
        .collect();

    let added = new_cids.difference(&old_cids).cloned().collect();
    let removed = old_cids.difference(&new_cids).cloned().collect();
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_single_blob_ref() {
        let value = json!({
            "$type": "app.bsky.feed.post",
            "text": "hello",
            "embed": {
                "$type": "blob",
                "ref": { "$link": "bafy123" },
                "mimeType": "image/jpeg",
                "size": 4096
            }
        });
        let refs = extract_blob_refs(&value);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].cid, "bafy123");
        assert_eq!(refs[0].mime_type, "image/jpeg");
        assert_eq!(refs[0].size, 4096);
    }

    #[test]
    fn extracts_blob_refs_nested_in_array() {
        let value = json!({
            "images": [
                { "$type": "blob", "ref": { "$link": "cid-a" }, "mimeType": "image/png", "size": 1 },
                { "$type": "blob", "ref": { "$link": "cid-b" }, "mimeType": "image/png", "size": 2 },
            ]
        });
        let refs = extract_blob_refs(&value);
        assert_eq!(refs.len(), 2);
    }

    #[test]
    fn ignores_records_with_no_blobs() {
        let value = json!({"$type": "app.bsky.feed.like", "subject": {"uri": "at://x"}});
        assert!(extract_blob_refs(&value).is_empty());
    }

    #[test]
    fn diff_detects_added_and_removed() {
        let old = json!({"embed": {"$type": "blob", "ref": {"$link": "old-cid"}, "mimeType": "image/png", "size": 1}});
        let new = json!({"embed": {"$type": "blob", "ref": {"$link": "new-cid"}, "mimeType": "image/png", "size": 1}});
        let (added, removed) = diff_blob_refs(Some(&old), Some(&new));
        assert_eq!(added, vec!["new-cid".to_string()]);
        assert_eq!(removed, vec!["old-cid".to_string()]);
    }

    #[test]
    fn diff_on_create_has_no_removed() {
        let new = json!({"embed": {"$type": "blob", "ref": {"$link": "cid"}, "mimeType": "image/png", "size": 1}});
        let (added, removed) = diff_blob_refs(None, Some(&new));
        assert_eq!(added, vec!["cid".to_string()]);
        assert!(removed.is_empty());
    }
}
