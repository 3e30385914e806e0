use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationResponse {
    pub url: Url,
    /// `None` for schemes without HTTP semantics (custom schemes, `data:`).
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub expected_length: Option<u64>,
    #[serde(default = "default_can_show")]
    pub can_show_mime_type: bool,
    #[serde(default)]
    pub should_download: bool,
}

fn default_can_show() -> bool {
    true
}

impl NavigationResponse {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            status: None,
            mime_type: None,
            headers: BTreeMap::new(),
            expected_length: None,
            can_show_mime_type: true,
            should_download: false,
        }
    }

    pub fn http(url: Url, status: u16, mime_type: &str) -> Self {
        Self {
            status: Some(status),
            mime_type: Some(mime_type.to_string()),
            ..Self::new(url)
        }
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.expected_length = Some(length);
        self
    }

    pub fn is_http(&self) -> bool {
        self.status.is_some()
    }

    /// `None` when the response carries no status to judge by.
    pub fn is_successful(&self) -> Option<bool> {
        self.status.map(|status| (200..300).contains(&status))
    }
}
