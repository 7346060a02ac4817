use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Directory outside of which nothing is served.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Total bytes the cache may hold. Unset means the cache only grows,
    /// which is fine for a small static tree but not for dynamic content.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

fn default_root() -> PathBuf {
    PathBuf::from("./public_html")
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            root: default_root(),
            max_bytes: None,
        }
    }
}
