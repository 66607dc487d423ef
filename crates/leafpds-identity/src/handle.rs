use leafpds_core::{PdsError, PdsResult};

/// Reserved first segments that may never be claimed as a handle,
/// regardless of the configured `handle_domain`.
const RESERVED_HANDLES: &[&str] = &[
    "admin", "root", "system", "mod", "support", "abuse", "postmaster", "api", "www", "mail",
    "dns", "cdn", "atproto", "bsky", "pds", "relay", "feed", "labeler", "plc", "did", "handle",
    "null", "undefined", "everyone",
];

/// Validate a full handle (e.g. `alice.example.com`) per AT Protocol
/// handle syntax: dot-separated segments, each a DNS label, leading
/// segment not in the reserved list.
pub fn validate_handle(handle: &str) -> PdsResult<()> {
    if handle.is_empty() || handle.len() > 253 {
        return Err(PdsError::InvalidHandle);
    }
    let segments: Vec<&str> = handle.split('.').collect();
    if segments.len() < 2 {
        return Err(PdsError::InvalidHandle);
    }
    for segment in &segments {
        if !is_valid_segment(segment) {
            return Err(PdsError::InvalidHandle);
        }
    }
    let leading = segments[0].to_lowercase();
    if RESERVED_HANDLES.contains(&leading.as_str()) {
        return Err(PdsError::InvalidHandle);
    }
    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    if segment.is_empty() || segment.len() > 63 {
        return false;
    }
    let bytes = segment.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_alphanumeric();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| is_alnum(b) || b == b'-')
}

/// Turn a raw, user-supplied username (e.g. a GitHub login) into a
/// candidate handle under `handle_domain`. Does not check availability;
/// see [`allocate_unique_handle`].
pub fn generate_handle_candidate(raw_username: &str, handle_domain: &str) -> String {
    let mut normalized = String::with_capacity(raw_username.len());
    for c in raw_username.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            normalized.push(c);
        } else {
            normalized.push('-');
        }
    }

    let trimmed = normalized.trim_matches('-');
    let mut collapsed = String::with_capacity(trimmed.len());
    let mut last_was_dash = false;
    for c in trimmed.chars() {
        if c == '-' {
            if !last_was_dash {
                collapsed.push(c);
            }
            last_was_dash = true;
        } else {
            collapsed.push(c);
            last_was_dash = false;
        }
    }

    let mut base = if collapsed.is_empty() {
        "user".to_string()
    } else {
        collapsed
    };
    base.truncate(20);
    let base = base.trim_end_matches('-');
    let base = if base.is_empty() { "user" } else { base };

    format!("{base}.{handle_domain}")
}

/// Append `1, 2, 3, …` before the domain until `is_taken` reports free,
/// giving up after 1000 attempts.
pub async fn allocate_unique_handle<F, Fut>(
    candidate: &str,
    handle_domain: &str,
    is_taken: F,
) -> PdsResult<String>
where
    F: Fn(String) -> Fut,
    Fut: std::future::Future<Output = PdsResult<bool>>,
{
    if !is_taken(candidate.to_string()).await? {
        return Ok(candidate.to_string());
    }

    let base = candidate
        .strip_suffix(&format!(".{handle_domain}"))
        .unwrap_or(candidate);

    for n in 1..1000u32 {
        let attempt = format!("{base}{n}.{handle_domain}");
        if !is_taken(attempt.clone()).await? {
            return Ok(attempt);
        }
    }

    Err(PdsError::HandleAlreadyTaken)
}

/// Resolve a handle to a DID using DNS TXT and HTTPS fallback.
///
/// 1. Try DNS TXT record at `_atproto.{handle}` looking for `did=did:...`
/// 2. Fallback to HTTPS: `https://{handle}/.well-known/atproto-did`
pub async fn resolve_handle(handle: &str) -> PdsResult<Option<String>> {
    match resolve_handle_dns(handle).await {
        Ok(Some(did)) => return Ok(Some(did)),
        Ok(None) => {}
        Err(e) => {
            tracing::debug!("DNS handle resolution failed for {handle}: {e}");
        }
    }

    match resolve_handle_https(handle).await {
        Ok(Some(did)) => Ok(Some(did)),
        Ok(None) => Ok(None),
        Err(e) => {
            tracing::debug!("HTTPS handle resolution failed for {handle}: {e}");
            Ok(None)
        }
    }
}

const RESOLUTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

async fn resolve_handle_dns(handle: &str) -> PdsResult<Option<String>> {
    use hickory_resolver::Resolver;

    let resolver = Resolver::builder_tokio()
        .map_err(|e| PdsError::InternalError(format!("DNS resolver init failed: {e}")))?
        .build();

    let lookup_name = format!("_atproto.{handle}.");
    let txt_lookup = tokio::time::timeout(RESOLUTION_TIMEOUT, resolver.txt_lookup(&lookup_name))
        .await
        .map_err(|_| PdsError::Upstream("DNS TXT lookup timed out".into()))?
        .map_err(|e| PdsError::Upstream(format!("DNS TXT lookup failed: {e}")))?;

    for record in txt_lookup {
        let txt = record.to_string();
        if let Some(did) = txt.strip_prefix("did=") {
            let did = did.trim();
            if did.starts_with("did:") {
                return Ok(Some(did.to_string()));
            }
        }
    }

    Ok(None)
}

async fn resolve_handle_https(handle: &str) -> PdsResult<Option<String>> {
    let url = format!("https://{handle}/.well-known/atproto-did");
    let client = reqwest::Client::builder()
        .timeout(RESOLUTION_TIMEOUT)
        .build()
        .map_err(|e| PdsError::InternalError(e.to_string()))?;

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| PdsError::Upstream(e.to_string()))?;

    if !resp.status().is_success() {
        return Ok(None);
    }

    let body = resp.text().await.map_err(|e| PdsError::Upstream(e.to_string()))?;

    let did = body.trim();
    if did.starts_with("did:") {
        Ok(Some(did.to_string()))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_handle() {
        assert!(validate_handle("alice.example.com").is_ok());
        assert!(validate_handle("a-b.c-d.example").is_ok());
    }

    #[test]
    fn rejects_single_segment() {
        assert!(validate_handle("alice").is_err());
    }

    #[test]
    fn rejects_reserved_leading_segment() {
        assert!(validate_handle("admin.example.com").is_err());
        assert!(validate_handle("ADMIN.example.com").is_err());
    }

    #[test]
    fn rejects_segment_over_63_chars() {
        let long_segment = "a".repeat(64);
        let handle = format!("{long_segment}.example.com");
        assert!(validate_handle(&handle).is_err());
    }

    #[test]
    fn accepts_segment_at_63_chars() {
        let segment = "a".repeat(63);
        let handle = format!("{segment}.example.com");
        assert!(validate_handle(&handle).is_ok());
    }

    #[test]
    fn rejects_segment_starting_with_dash() {
        assert!(validate_handle("-alice.example.com").is_err());
    }

    #[test]
    fn generates_lowercase_slug() {
        let handle = generate_handle_candidate("AliceW00t!!", "example.com");
        assert_eq!(handle, "alicew00t.example.com");
    }

    #[test]
    fn collapses_and_trims_dashes() {
        let handle = generate_handle_candidate("  --weird__name--  ", "example.com");
        assert_eq!(handle, "weird-name.example.com");
    }

    #[test]
    fn empty_username_falls_back_to_user() {
        let handle = generate_handle_candidate("!!!", "example.com");
        assert_eq!(handle, "user.example.com");
    }

    #[tokio::test]
    async fn allocator_returns_candidate_if_free() {
        let result = allocate_unique_handle("alice.example.com", "example.com", |_| async { Ok(false) })
            .await
            .unwrap();
        assert_eq!(result, "alice.example.com");
    }

    #[tokio::test]
    async fn allocator_suffixes_on_collision() {
        let result = allocate_unique_handle("alice.example.com", "example.com", |candidate| async move {
            Ok(candidate == "alice.example.com" || candidate == "alice1.example.com")
        })
        .await
        .unwrap();
        assert_eq!(result, "alice2.example.com");
    }
}
