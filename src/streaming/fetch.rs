//! Fetch transport seam, availability tests and redirect handling

use super::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// Maximum number of redirects followed for one resource
pub const MAX_REDIRECTS: u32 = 5;

/// Request handed to a [`Fetcher`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub kind: ResourceKind,
}

/// Reply from a [`Fetcher`]
///
/// `code` follows HTTP status semantics; 0 means the transport failed
/// before any status was received (timeouts included).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchReply {
    pub code: u32,
    pub content: Vec<u8>,
    pub content_type: String,
    pub redirect_url: Option<String>,
}

impl FetchReply {
    pub fn ok(content: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            code: 200,
            content: content.into(),
            content_type: content_type.into(),
            redirect_url: None,
        }
    }

    pub fn status(code: u32) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn redirect(code: u32, url: impl Into<String>) -> Self {
        Self {
            code,
            redirect_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.code, 301 | 302 | 303 | 307 | 308)
    }
}

/// Blocking transport used by worker threads
///
/// Implementations own timeouts and connection handling; the engine only
/// sees the final reply.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> FetchReply;
}

/// Rules that mark a reply as "intentionally absent"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AvailabilityTest {
    /// Any of these status codes means absent
    NegativeCode { codes: BTreeSet<u32> },
    /// This content type means absent
    NegativeType { mime: String },
    /// Content no longer than this means absent
    NegativeSize { size: usize },
}

impl AvailabilityTest {
    pub fn rejects(&self, reply: &FetchReply) -> bool {
        match self {
            AvailabilityTest::NegativeCode { codes } => codes.contains(&reply.code),
            AvailabilityTest::NegativeType { mime } => reply.content_type == *mime,
            AvailabilityTest::NegativeSize { size } => reply.content.len() <= *size,
        }
    }
}

/// Why a download did not produce usable content
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResourceFailure {
    #[error("transport failure (status {code})")]
    Transport { code: u32 },

    #[error("redirect limit exceeded after {hops} hops")]
    RedirectLimit { hops: u32 },

    #[error("resource reported unavailable (status {code})")]
    Unavailable { code: u32 },
}

impl ResourceFailure {
    /// Failures that will not go away by asking again
    pub fn is_permanent(&self) -> bool {
        match self {
            ResourceFailure::Unavailable { .. } => true,
            ResourceFailure::Transport { code } => (400..500).contains(code),
            ResourceFailure::RedirectLimit { .. } => false,
        }
    }
}

/// Fetch `url`, following redirects and applying the availability test
///
/// Redirect replies are only checked against status code rules; size and
/// type rules apply to the final reply.
pub fn fetch_with_redirects(
    fetcher: &dyn Fetcher,
    url: &str,
    kind: ResourceKind,
    availability: Option<&AvailabilityTest>,
) -> Result<FetchReply, ResourceFailure> {
    let mut url = url.to_string();
    let mut hops = 0;
    loop {
        let reply = fetcher.fetch(&FetchRequest { url: url.clone(), kind });

        if reply.is_redirect() {
            let code_rule = availability
                .filter(|test| matches!(test, AvailabilityTest::NegativeCode { .. }));
            if code_rule.is_some_and(|test| test.rejects(&reply)) {
                return Err(ResourceFailure::Unavailable { code: reply.code });
            }
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(ResourceFailure::RedirectLimit { hops });
            }
            match reply.redirect_url {
                Some(next) => {
                    log::debug!("redirect {} -> {}", url, next);
                    url = next;
                    continue;
                }
                None => return Err(ResourceFailure::Transport { code: reply.code }),
            }
        }

        if availability.is_some_and(|test| test.rejects(&reply)) {
            return Err(ResourceFailure::Unavailable { code: reply.code });
        }
        if reply.code == 0 || reply.code >= 400 {
            return Err(ResourceFailure::Transport { code: reply.code });
        }
        return Ok(reply);
    }
}

/// Serves `file://` URLs and plain paths from the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFetcher;

impl LocalFetcher {
    fn content_type(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => "application/json",
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        }
    }
}

impl Fetcher for LocalFetcher {
    fn fetch(&self, request: &FetchRequest) -> FetchReply {
        let path = Path::new(request.url.strip_prefix("file://").unwrap_or(&request.url));
        match std::fs::read(path) {
            Ok(content) => FetchReply::ok(content, Self::content_type(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FetchReply::status(404),
            Err(e) => {
                log::warn!("failed to read {}: {}", path.display(), e);
                FetchReply::status(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;

    fn negative_code(code: u32) -> AvailabilityTest {
        AvailabilityTest::NegativeCode { codes: BTreeSet::from([code]) }
    }

    #[test]
    fn test_plain_success() {
        let fetcher = MockFetcher::new();
        fetcher.insert("a", FetchReply::ok("data", "text/plain"));
        let reply = fetch_with_redirects(&fetcher, "a", ResourceKind::Texture, None).unwrap();
        assert_eq!(reply.content, b"data");
    }

    #[test]
    fn test_status_failures() {
        let fetcher = MockFetcher::new();
        fetcher.insert("gone", FetchReply::status(404));
        fetcher.insert("down", FetchReply::status(503));
        fetcher.insert("timeout", FetchReply::status(0));

        let gone = fetch_with_redirects(&fetcher, "gone", ResourceKind::Texture, None).unwrap_err();
        assert_eq!(gone, ResourceFailure::Transport { code: 404 });
        assert!(gone.is_permanent());

        let down = fetch_with_redirects(&fetcher, "down", ResourceKind::Texture, None).unwrap_err();
        assert!(!down.is_permanent());

        let timeout = fetch_with_redirects(&fetcher, "timeout", ResourceKind::Texture, None).unwrap_err();
        assert_eq!(timeout, ResourceFailure::Transport { code: 0 });
    }

    #[test]
    fn test_five_redirects_are_followed() {
        let fetcher = MockFetcher::new();
        fetcher.insert_redirect_chain("r", 5, FetchReply::ok("end", "text/plain"));
        let reply = fetch_with_redirects(&fetcher, "r", ResourceKind::Texture, None).unwrap();
        assert_eq!(reply.content, b"end");
    }

    #[test]
    fn test_six_redirects_fail() {
        let fetcher = MockFetcher::new();
        fetcher.insert_redirect_chain("r", 6, FetchReply::ok("end", "text/plain"));
        let err = fetch_with_redirects(&fetcher, "r", ResourceKind::Texture, None).unwrap_err();
        assert_eq!(err, ResourceFailure::RedirectLimit { hops: 6 });
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_availability_negative_code() {
        let fetcher = MockFetcher::new();
        fetcher.insert("meta", FetchReply::status(404));
        let err = fetch_with_redirects(&fetcher, "meta", ResourceKind::MetaTile, Some(&negative_code(404)))
            .unwrap_err();
        assert_eq!(err, ResourceFailure::Unavailable { code: 404 });
        assert!(err.is_permanent());
    }

    #[test]
    fn test_availability_type_and_size() {
        let fetcher = MockFetcher::new();
        fetcher.insert("empty", FetchReply::ok(vec![0u8; 10], "image/png"));
        fetcher.insert("placeholder", FetchReply::ok(vec![0u8; 500], "text/html"));

        let size = AvailabilityTest::NegativeSize { size: 10 };
        assert!(fetch_with_redirects(&fetcher, "empty", ResourceKind::Texture, Some(&size)).is_err());
        assert!(fetch_with_redirects(&fetcher, "placeholder", ResourceKind::Texture, Some(&size)).is_ok());

        let mime = AvailabilityTest::NegativeType { mime: "text/html".into() };
        assert!(fetch_with_redirects(&fetcher, "placeholder", ResourceKind::Texture, Some(&mime)).is_err());
    }

    #[test]
    fn test_size_rule_ignores_redirect_replies() {
        let fetcher = MockFetcher::new();
        fetcher.insert_redirect_chain("r", 1, FetchReply::ok(vec![0u8; 100], "image/png"));
        let size = AvailabilityTest::NegativeSize { size: 10 };
        assert!(fetch_with_redirects(&fetcher, "r", ResourceKind::Texture, Some(&size)).is_ok());
    }

    #[test]
    fn test_availability_json() {
        let test: AvailabilityTest =
            serde_json::from_str(r#"{"type": "negativeCode", "codes": [204, 404]}"#).unwrap();
        assert!(test.rejects(&FetchReply::status(204)));
        assert!(!test.rejects(&FetchReply::status(200)));
    }

    #[test]
    fn test_local_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let url = format!("file://{}", path.display());
        let reply = LocalFetcher.fetch(&FetchRequest { url, kind: ResourceKind::MapConfig });
        assert_eq!(reply.code, 200);
        assert_eq!(reply.content_type, "application/json");

        let missing = dir.path().join("missing.json").display().to_string();
        let reply = LocalFetcher.fetch(&FetchRequest { url: missing, kind: ResourceKind::MapConfig });
        assert_eq!(reply.code, 404);
    }
}
