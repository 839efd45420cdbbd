/*!
 * Bluetooth Device Management
 * Media device control through BlueZ command line tooling
 */

use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::bridge::{Bridge, BridgeError, BusTarget, DbusCall};
use crate::config::BluetoothConfig;
use crate::reply::{ParseError, ParsedReply, ReplyParser, META_KEY};

const MEDIA_PLAYER_IFACE: &str = "org.bluez.MediaPlayer1";
const PROPERTIES_GET: &str = "org.freedesktop.DBus.Properties.Get";

#[derive(Error, Debug)]
pub enum InfoError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("empty reply")]
    Empty,

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Transport controls exposed by `org.bluez.MediaPlayer1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Previous,
    Next,
    Play,
    Pause,
}

impl Transport {
    pub fn method(self) -> String {
        let name = match self {
            Transport::Previous => "Previous",
            Transport::Next => "Next",
            Transport::Play => "Play",
            Transport::Pause => "Pause",
        };
        format!("{}.{}", MEDIA_PLAYER_IFACE, name)
    }
}

/// `slug(artist)/slug(album).jpg`
pub fn album_artwork(artist: &str, album: &str) -> String {
    format!("{}/{}.jpg", slug::slugify(artist), slug::slugify(album))
}

pub struct BluetoothManager {
    bridge: Arc<Bridge>,
    parser: ReplyParser,
    transport_node: Regex,
    tmux_session: String,
    tmux_started: AtomicBool,
    connect_delay: Duration,
}

impl BluetoothManager {
    pub fn new(bridge: Arc<Bridge>, config: &BluetoothConfig) -> Self {
        let transport_node = Regex::new(&format!(
            r"/org/bluez/{}/dev_([^/\s]+)/",
            regex::escape(&config.adapter)
        ))
        .expect("transport node regex must compile");

        Self {
            bridge,
            parser: ReplyParser::new(),
            transport_node,
            tmux_session: config.tmux_session.clone(),
            tmux_started: AtomicBool::new(false),
            connect_delay: config.connect_delay(),
        }
    }

    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    async fn read_player_property(&self, property: &str) -> Result<ParsedReply, InfoError> {
        let call = DbusCall::new(BusTarget::Player, PROPERTIES_GET)
            .arg(format!("string:{}", MEDIA_PLAYER_IFACE))
            .arg(format!("string:{}", property))
            .quiet();

        let reply = self.bridge.dbus_send(&call).await?;
        if reply.trim().is_empty() {
            tracing::warn!(
                "Empty dbus response when reading {}, not attempting to parse",
                property
            );
            return Err(InfoError::Empty);
        }

        self.parser.parse(&reply).map_err(|e| {
            tracing::error!("Error parsing dbus output ({}). Full output:\n{}", e, reply);
            InfoError::from(e)
        })
    }

    /// Player status; a bare status string lands under `Meta`.
    pub async fn device_info(&self) -> Result<ParsedReply, InfoError> {
        tracing::info!("Getting device info...");
        self.read_player_property("Status").await
    }

    /// Current track metadata merged with the player status.
    pub async fn media_info(&self) -> Result<ParsedReply, InfoError> {
        let device = self.device_info().await?;

        tracing::info!("Getting media info...");
        let mut media = self.read_player_property("Track").await?;

        media.insert(
            "Status".to_string(),
            device.get(META_KEY).cloned().unwrap_or_default(),
        );

        if let (Some(album), Some(artist)) = (media.get("Album"), media.get("Artist")) {
            let artwork = album_artwork(artist, album);
            media.insert("Album_Artwork".to_string(), artwork);
        }

        Ok(media)
    }

    /// Restart the tmux-hosted `bluetoothctl` session with scanning on.
    pub async fn scan_on(&self) {
        tracing::info!("Turning scan on...");
        let session = self.tmux_session.as_str();

        if self.tmux_started.load(Ordering::SeqCst) {
            let _ = self
                .bridge
                .run("tmux", &args(&["kill-session", "-t", session]), true)
                .await;
        }

        let commands = [
            args(&["new-session", "-d", "-s", session, "bluetoothctl"]),
            args(&["send-keys", "-t", session, "-l", "scan on"]),
            args(&["send-keys", "-t", session, "Enter"]),
        ];
        for command in &commands {
            if let Err(e) = self.bridge.run("tmux", command, true).await {
                tracing::error!("Error turning scan on: {}", e);
            }
        }

        self.tmux_started.store(true, Ordering::SeqCst);
    }

    /// Scan, give the device time to show up, then ask BlueZ to connect.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        self.scan_on().await;
        tracing::info!("Connecting to bluetooth device...");
        tokio::time::sleep(self.connect_delay).await;

        self.bridge
            .dbus_send(&DbusCall::new(BusTarget::Device, "org.bluez.Device1.Connect"))
            .await?;
        tracing::info!("Connection successful.");
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        tracing::info!("Disconnecting from bluetooth device...");
        self.bridge
            .dbus_send(&DbusCall::new(BusTarget::Device, "org.bluez.Device1.Disconnect"))
            .await?;
        Ok(())
    }

    /// Fire a transport command in the background; the result is only logged.
    pub fn send_transport(&self, transport: Transport) -> JoinHandle<()> {
        tracing::info!("Sending {:?} to media player", transport);
        let bridge = self.bridge.clone();

        tokio::spawn(async move {
            let call = DbusCall::new(BusTarget::Player, transport.method());
            if let Err(e) = bridge.dbus_send(&call).await {
                tracing::warn!("{:?} failed: {}", transport, e);
            }
        })
    }

    /// Address of the device currently holding a media transport, taken
    /// from the first `/fd` node in the BlueZ object tree.
    pub async fn connected_address(&self) -> Result<Option<String>, BridgeError> {
        let tree = self
            .bridge
            .run("busctl", &args(&["tree", "org.bluez"]), true)
            .await?;
        Ok(self.address_from_tree(&tree))
    }

    fn address_from_tree(&self, tree: &str) -> Option<String> {
        let line = tree.lines().find(|l| l.contains("/fd"))?;
        self.transport_node
            .captures(line)
            .map(|c| c[1].trim().to_string())
            .filter(|a| !a.is_empty())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
