/*!
 * Address Auto-Refresh
 * Follows whichever device BlueZ currently streams media from
 */

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::bluetooth::BluetoothManager;

#[derive(Clone)]
pub struct AddressRefresher {
    bluetooth: Arc<BluetoothManager>,
    interval: Duration,
}

impl AddressRefresher {
    pub fn new(bluetooth: Arc<BluetoothManager>, interval: Duration) -> Self {
        Self { bluetooth, interval }
    }

    /// One pass over the object tree. Returns true when the active address
    /// changed.
    pub async fn tick(&self) -> bool {
        let candidate = match self.bluetooth.connected_address().await {
            Ok(Some(address)) => address,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!("Address refresh skipped: {}", e);
                return false;
            }
        };

        let store = self.bluetooth.bridge().address_store();
        if store.address().await == candidate {
            return false;
        }

        tracing::info!("Found new connected media device with address: {}", candidate);
        store.set_address(&candidate).await.is_some()
    }

    /// Tick forever, sleeping between passes.
    pub async fn run(self) {
        tracing::info!(
            "Enabling auto refresh of BT address every {:?}",
            self.interval
        );
        loop {
            self.tick().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    pub fn spawn(&self) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    /// Schedule one immediate pass without waiting for it.
    pub fn force(&self) -> JoinHandle<bool> {
        tracing::info!("Forcing refresh of BT address");
        let refresher = self.clone();
        tokio::spawn(async move { refresher.tick().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::AddressStore;
    use crate::bridge::{Bridge, MockRunner};
    use crate::config::BluetoothConfig;
    use crate::settings::{SettingsBlob, SettingsStore, BLUETOOTH_ADDRESS_KEY, CONFIG_COMPONENT};

    const TREE: &str = "└─/org/bluez/hci0
  └─/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF
    └─/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/sep1
      └─/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/sep1/fd0
";

    fn refresher(
        runner: Arc<MockRunner>,
    ) -> (AddressRefresher, Arc<AddressStore>, Arc<SettingsStore>) {
        let config = BluetoothConfig::default();
        let settings = Arc::new(SettingsStore::in_memory(SettingsBlob::new()));
        let store = Arc::new(AddressStore::new(settings.clone()));
        let bridge = Arc::new(Bridge::new(runner, store.clone(), &config));
        let bluetooth = Arc::new(BluetoothManager::new(bridge, &config));
        (
            AddressRefresher::new(bluetooth, Duration::from_millis(10)),
            store,
            settings,
        )
    }

    #[tokio::test]
    async fn new_device_updates_store() {
        let runner = Arc::new(MockRunner::with_responses(vec![Ok(TREE.into())]));
        let (refresher, store, settings) = refresher(runner);

        assert!(refresher.tick().await);
        assert_eq!(store.address().await, "AA_BB_CC_DD_EE_FF");
        assert_eq!(
            settings
                .get(CONFIG_COMPONENT, BLUETOOTH_ADDRESS_KEY)
                .await
                .as_deref(),
            Some("AA_BB_CC_DD_EE_FF")
        );
    }

    #[tokio::test]
    async fn same_device_is_not_rewritten() {
        let runner = Arc::new(MockRunner::with_responses(vec![Ok(TREE.into())]));
        let (refresher, store, settings) = refresher(runner);

        store.set_address("AA:BB:CC:DD:EE:FF").await;
        settings
            .set(CONFIG_COMPONENT, BLUETOOTH_ADDRESS_KEY, "untouched")
            .await
            .unwrap();

        assert!(!refresher.tick().await);
        assert_eq!(store.address().await, "AA_BB_CC_DD_EE_FF");
        assert_eq!(
            settings
                .get(CONFIG_COMPONENT, BLUETOOTH_ADDRESS_KEY)
                .await
                .as_deref(),
            Some("untouched")
        );
    }

    #[tokio::test]
    async fn failures_keep_the_current_address() {
        let runner = Arc::new(MockRunner::with_responses(vec![Err(
            "Failed to get objects: Unknown object".into(),
        )]));
        let (refresher, store, _) = refresher(runner);
        store.set_address("11:22").await;

        assert!(!refresher.tick().await);
        assert_eq!(store.address().await, "11_22");
    }

    /// Let spawned tasks run until they park on the clock.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_errors() {
        let runner = Arc::new(MockRunner::with_responses(vec![
            Err("busctl: bus unavailable".into()),
            Ok(TREE.into()),
        ]));
        let (refresher, store, _) = refresher(runner.clone());

        let handle = refresher.spawn();

        // First pass fails on the bus error
        settle().await;
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(store.address().await, "");

        // One interval later the loop is still ticking
        tokio::time::advance(Duration::from_millis(10)).await;
        settle().await;
        handle.abort();

        assert_eq!(runner.calls().len(), 2);
        assert_eq!(store.address().await, "AA_BB_CC_DD_EE_FF");
    }

    #[tokio::test]
    async fn force_runs_one_pass() {
        let runner = Arc::new(MockRunner::with_responses(vec![Ok(TREE.into())]));
        let (refresher, store, _) = refresher(runner.clone());

        assert!(refresher.force().await.unwrap());
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(store.address().await, "AA_BB_CC_DD_EE_FF");
    }
}
