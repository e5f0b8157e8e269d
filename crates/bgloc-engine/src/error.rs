#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// `set_config` has not been called yet; the location was not persisted.
    #[error("sync queue has no config; location skipped")]
    ConfigMissing,
    /// The synchronous persist failed. Fatal to this call only.
    #[error("location store failure: {0:#}")]
    Store(anyhow::Error),
}
