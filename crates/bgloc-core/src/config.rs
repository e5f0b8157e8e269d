use std::collections::BTreeMap;
use std::sync::Arc;

use crate::template::{DefaultTemplate, PayloadTemplate};

pub const DEFAULT_SYNC_THRESHOLD: u32 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sync threshold must be a positive count")]
    InvalidThreshold,
}

/// Immutable posting configuration. The engine swaps whole snapshots, it
/// never mutates one in place.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    immediate_post_url: Option<String>,
    sync_url: Option<String>,
    sync_threshold: u32,
    http_headers: BTreeMap<String, String>,
    template: Arc<dyn PayloadTemplate>,
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    pub fn immediate_post_url(&self) -> Option<&str> {
        self.immediate_post_url.as_deref()
    }

    pub fn sync_url(&self) -> Option<&str> {
        self.sync_url.as_deref()
    }

    pub fn sync_threshold(&self) -> u32 {
        self.sync_threshold
    }

    pub fn http_headers(&self) -> &BTreeMap<String, String> {
        &self.http_headers
    }

    pub fn template(&self) -> &dyn PayloadTemplate {
        self.template.as_ref()
    }

    pub fn has_valid_url(&self) -> bool {
        is_valid_url(self.immediate_post_url.as_deref())
    }

    pub fn has_valid_sync_url(&self) -> bool {
        is_valid_url(self.sync_url.as_deref())
    }

    /// No usable endpoint at all: every location is only persisted.
    pub fn is_persist_only(&self) -> bool {
        !self.has_valid_url() && !self.has_valid_sync_url()
    }
}

/// Non-empty absolute http(s) URL.
pub fn is_valid_url(url: Option<&str>) -> bool {
    let Some(raw) = url.map(str::trim) else {
        return false;
    };
    if raw.is_empty() {
        return false;
    }
    match url::Url::parse(raw) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.has_host(),
        Err(_) => false,
    }
}

#[derive(Debug)]
pub struct SyncConfigBuilder {
    immediate_post_url: Option<String>,
    sync_url: Option<String>,
    sync_threshold: u32,
    http_headers: BTreeMap<String, String>,
    template: Arc<dyn PayloadTemplate>,
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self {
            immediate_post_url: None,
            sync_url: None,
            sync_threshold: DEFAULT_SYNC_THRESHOLD,
            http_headers: BTreeMap::new(),
            template: Arc::new(DefaultTemplate),
        }
    }
}

impl SyncConfigBuilder {
    pub fn immediate_post_url(mut self, url: impl Into<String>) -> Self {
        self.immediate_post_url = Some(url.into());
        self
    }

    pub fn sync_url(mut self, url: impl Into<String>) -> Self {
        self.sync_url = Some(url.into());
        self
    }

    pub fn sync_threshold(mut self, threshold: u32) -> Self {
        self.sync_threshold = threshold;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.http_headers.insert(name.into(), value.into());
        self
    }

    pub fn http_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.http_headers = headers;
        self
    }

    pub fn template(mut self, template: Arc<dyn PayloadTemplate>) -> Self {
        self.template = template;
        self
    }

    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        if self.sync_threshold == 0 {
            return Err(ConfigError::InvalidThreshold);
        }
        Ok(SyncConfig {
            immediate_post_url: self.immediate_post_url,
            sync_url: self.sync_url,
            sync_threshold: self.sync_threshold,
            http_headers: self.http_headers,
            template: self.template,
        })
    }
}
