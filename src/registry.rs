use crate::error::{RacoderError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Bitrate used when neither the stream nor the defaults specify one
pub const DEFAULT_BITRATE: &str = "128k";

/// Normalize a request or output path.
///
/// Strips a single trailing slash, except for the root path `/`.
/// Normalizing an already-normalized path is a no-op.
pub fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// A single configured stream: where to read from, where to serve it, and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDefinition {
    /// Normalized output path (always starts with `/`)
    pub path: String,
    /// Source URI handed to the worker
    pub source_uri: String,
    /// Opaque bitrate token passed to the worker, e.g. `128k`
    pub bitrate: String,
}

impl StreamDefinition {
    pub fn new(
        path: impl AsRef<str>,
        source_uri: impl Into<String>,
        bitrate: impl Into<String>,
    ) -> Self {
        Self {
            path: normalize_path(path.as_ref()).to_string(),
            source_uri: source_uri.into(),
            bitrate: bitrate.into(),
        }
    }
}

/// Immutable mapping from normalized path to stream definition.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug, Clone)]
pub struct StreamRegistry {
    streams: Arc<HashMap<String, StreamDefinition>>,
}

impl StreamRegistry {
    /// Build the registry, rejecting an empty list and duplicate paths
    pub fn from_definitions(definitions: Vec<StreamDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(RacoderError::config("No stream source configured"));
        }

        let mut streams = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if !definition.path.starts_with('/') {
                return Err(RacoderError::config(format!(
                    "Output path must start with '/': {}",
                    definition.path
                )));
            }
            if streams.contains_key(&definition.path) {
                return Err(RacoderError::config(format!(
                    "Duplicate output path '{}' found in config",
                    definition.path
                )));
            }
            streams.insert(definition.path.clone(), definition);
        }

        Ok(Self {
            streams: Arc::new(streams),
        })
    }

    /// Look up the stream served at `path` (normalized before lookup)
    pub fn lookup(&self, path: &str) -> Option<&StreamDefinition> {
        self.streams.get(normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Iterate over all definitions, sorted by path
    pub fn iter(&self) -> impl Iterator<Item = &StreamDefinition> {
        let mut definitions: Vec<_> = self.streams.values().collect();
        definitions.sort_by(|a, b| a.path.cmp(&b.path));
        definitions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(paths: &[&str]) -> Result<StreamRegistry> {
        StreamRegistry::from_definitions(
            paths
                .iter()
                .map(|p| StreamDefinition::new(p, "https://example.com/a.m3u8", "128k"))
                .collect(),
        )
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/stream/"), "/stream");
        assert_eq!(normalize_path("/stream"), "/stream");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for path in ["/", "/radio", "/radio/", "/a/b/"] {
            let once = normalize_path(path);
            assert_eq!(normalize_path(once), once);
        }
    }

    #[test]
    fn test_lookup_tolerates_trailing_slash() {
        let registry = registry(&["/radio"]).unwrap();
        let a = registry.lookup("/radio").unwrap();
        let b = registry.lookup("/radio/").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.source_uri, "https://example.com/a.m3u8");
    }

    #[test]
    fn test_registered_trailing_slash_is_normalized() {
        let registry = registry(&["/radio/"]).unwrap();
        assert!(registry.lookup("/radio").is_some());
    }

    #[test]
    fn test_root_path() {
        let registry = registry(&["/"]).unwrap();
        assert!(registry.lookup("/").is_some());
        assert!(registry.lookup("/other").is_none());
    }

    #[test]
    fn test_unknown_path_is_absent() {
        let registry = registry(&["/radio"]).unwrap();
        assert!(registry.lookup("/missing").is_none());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let err = registry(&["/stream1", "/stream1/"]).unwrap_err();
        assert!(
            err.to_string()
                .contains("Duplicate output path '/stream1' found in config")
        );
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(registry(&[]).is_err());
    }

    #[test]
    fn test_iter_sorted() {
        let registry = registry(&["/b", "/a", "/c"]).unwrap();
        let paths: Vec<_> = registry.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
        assert_eq!(registry.len(), 3);
    }
}
