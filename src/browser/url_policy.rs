//! Detection of privileged (browser-internal) URLs.

/// Decides whether a URL belongs to a page the host never lets extensions
/// hide, and which must not be persisted into a session.
pub trait UrlPolicy: Send + Sync {
    fn is_privileged(&self, url: &str) -> bool;
}

/// Prefix-list policy.
#[derive(Debug, Clone)]
pub struct PrefixUrlPolicy {
    prefixes: Vec<String>,
}

impl PrefixUrlPolicy {
    pub fn new(prefixes: Vec<String>) -> Self {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_ascii_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }
}

impl Default for PrefixUrlPolicy {
    fn default() -> Self {
        Self::new(crate::types::config::CoreConfig::default_privileged_prefixes())
    }
}

impl UrlPolicy for PrefixUrlPolicy {
    fn is_privileged(&self, url: &str) -> bool {
        let url = url.trim_start();
        // Case-insensitive scheme match without allocating the whole URL.
        self.prefixes.iter().any(|prefix| {
            url.len() >= prefix.len()
                && url.is_char_boundary(prefix.len())
                && url[..prefix.len()].eq_ignore_ascii_case(prefix)
        })
    }
}
