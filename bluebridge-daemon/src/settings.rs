/*!
 * Persistent Settings
 * Two-level component/name/value store backed by a JSON file
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

pub type Component = BTreeMap<String, String>;
pub type SettingsBlob = BTreeMap<String, Component>;

/// Component holding daemon-level values such as the device address.
pub const CONFIG_COMPONENT: &str = "CONFIG";
pub const BLUETOOTH_ADDRESS_KEY: &str = "BLUETOOTH_ADDRESS";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode settings: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<SettingsBlob>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file starts an empty blob that is
    /// created on the first write.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let data = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => SettingsBlob::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Settings file {} not found, starting empty",
                    path.display()
                );
                SettingsBlob::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Settings that live only in memory.
    #[cfg(test)]
    pub fn in_memory(data: SettingsBlob) -> Self {
        Self {
            path: None,
            data: RwLock::new(data),
        }
    }

    pub async fn all(&self) -> SettingsBlob {
        self.data.read().await.clone()
    }

    pub async fn component(&self, component: &str) -> Option<Component> {
        self.data.read().await.get(component).cloned()
    }

    pub async fn get(&self, component: &str, name: &str) -> Option<String> {
        self.data
            .read()
            .await
            .get(component)
            .and_then(|c| c.get(name))
            .cloned()
    }

    /// Set a value and write the whole blob back to disk. The new value only
    /// becomes visible once the write has succeeded.
    pub async fn set(&self, component: &str, name: &str, value: &str) -> Result<(), SettingsError> {
        let mut data = self.data.write().await;
        let mut updated = data.clone();
        updated
            .entry(component.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        tracing::debug!("Setting {}.{} = {}", component, name, value);

        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&updated)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, content).await?;
        }

        *data = updated;
        Ok(())
    }
}
