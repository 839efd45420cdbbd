/*!
 * Active Device Address
 * Holds the bus-path form of the device every command is routed to
 */

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::settings::{SettingsStore, BLUETOOTH_ADDRESS_KEY, CONFIG_COMPONENT};

/// Convert `AA:BB:CC:DD:EE:FF` into the `AA_BB_CC_DD_EE_FF` form used in
/// `/org/bluez/<adapter>/dev_*` object paths.
pub fn normalize(raw: &str) -> String {
    raw.trim().replace(':', "_")
}

pub struct AddressStore {
    current: RwLock<String>,
    settings: Arc<SettingsStore>,
}

impl AddressStore {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            current: RwLock::new(String::new()),
            settings,
        }
    }

    /// Seed from `CONFIG.BLUETOOTH_ADDRESS`, leaving the store unbound when
    /// the key is absent.
    pub async fn from_settings(settings: Arc<SettingsStore>) -> Self {
        let store = Self::new(settings.clone());
        match settings.get(CONFIG_COMPONENT, BLUETOOTH_ADDRESS_KEY).await {
            Some(address) => {
                store.set_address(&address).await;
            }
            None => {
                tracing::warn!("No bluetooth address found in settings, using empty address");
            }
        }
        store
    }

    pub async fn address(&self) -> String {
        self.current.read().await.clone()
    }

    /// Normalize and store `raw`, writing it back to settings. Returns the
    /// stored value, or `None` when `raw` normalizes to nothing.
    pub async fn set_address(&self, raw: &str) -> Option<String> {
        let address = normalize(raw);
        if address.is_empty() {
            return None;
        }

        // Persist under the guard so concurrent setters reach disk in the
        // same order they reach memory
        let mut current = self.current.write().await;
        *current = address.clone();
        tracing::info!("Now routing Bluetooth commands to {}", address);

        if let Err(e) = self
            .settings
            .set(CONFIG_COMPONENT, BLUETOOTH_ADDRESS_KEY, &address)
            .await
        {
            tracing::warn!("Failed to persist bluetooth address: {}", e);
        }
        Some(address)
    }
}
