use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bgloc_core::{FieldMapTemplate, SyncConfig, DEFAULT_SYNC_THRESHOLD};
use bgloc_transport::HttpTransportConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sync: SyncSection,
    #[serde(default)]
    pub transport: TransportSection,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Relative paths resolve against the directory holding `.bgloc/`.
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SyncSection {
    /// Immediate-post endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sync_url: Option<String>,
    #[serde(default = "default_threshold")]
    pub sync_threshold: u32,
    #[serde(default)]
    pub http_headers: BTreeMap<String, String>,
    /// Output key -> placeholder; absent means the record is posted as-is.
    #[serde(default)]
    pub template: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TransportSection {
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub probe_url: Option<String>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            probe_url: None,
        }
    }
}

fn default_threshold() -> u32 {
    DEFAULT_SYNC_THRESHOLD
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn default_for_dir() -> Self {
        Self {
            store: StoreConfig {
                path: ".bgloc/locations.db".to_string(),
            },
            sync: SyncSection {
                url: None,
                sync_url: None,
                sync_threshold: DEFAULT_SYNC_THRESHOLD,
                http_headers: BTreeMap::new(),
                template: None,
            },
            transport: TransportSection::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: AppConfig = toml::from_str(&s).with_context(|| "parse bgloc.toml")?;
        Ok(cfg)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".bgloc").join("bgloc.toml")
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&self.store.path).to_string());
        if expanded.is_absolute() {
            expanded
        } else {
            root.join(expanded)
        }
    }

    pub fn sync_config(&self) -> Result<SyncConfig> {
        let mut b = SyncConfig::builder()
            .sync_threshold(self.sync.sync_threshold)
            .http_headers(self.sync.http_headers.clone());
        if let Some(u) = &self.sync.url {
            b = b.immediate_post_url(u.clone());
        }
        if let Some(u) = &self.sync.sync_url {
            b = b.sync_url(u.clone());
        }
        if let Some(fields) = &self.sync.template {
            b = b.template(Arc::new(FieldMapTemplate::new(fields.clone())));
        }
        b.build().context("invalid [sync] section")
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.transport.read_timeout_secs),
            probe_url: self.transport.probe_url.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = AppConfig::config_path(dir.path());
        let mut cfg = AppConfig::default_for_dir();
        cfg.sync.url = Some("https://example.com/locations".into());
        cfg.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), cfg);
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bgloc.toml");
        std::fs::write(
            &path,
            r#"
[store]
path = "/var/lib/bgloc/locations.db"

[sync]
sync_url = "https://example.com/sync"
sync_threshold = 3

[sync.http_headers]
Authorization = "Bearer t"

[sync.template]
lat = "@latitude"
lon = "@longitude"
"#,
        )
        .unwrap();
        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.transport, TransportSection::default());
        assert_eq!(cfg.db_path(dir.path()), PathBuf::from("/var/lib/bgloc/locations.db"));

        let sync = cfg.sync_config().unwrap();
        assert!(!sync.has_valid_url());
        assert!(sync.has_valid_sync_url());
        assert_eq!(sync.sync_threshold(), 3);
        assert_eq!(sync.http_headers().len(), 1);
    }

    #[test]
    fn relative_store_path_joins_root() {
        let cfg = AppConfig::default_for_dir();
        let root = Path::new("/tmp/proj");
        assert_eq!(cfg.db_path(root), root.join(".bgloc/locations.db"));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut cfg = AppConfig::default_for_dir();
        cfg.sync.sync_threshold = 0;
        assert!(cfg.sync_config().is_err());
    }
}
