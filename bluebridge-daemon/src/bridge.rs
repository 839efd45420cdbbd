/*!
 * Subprocess Bridge
 * Runs the external Bluetooth tooling and hands back captured output
 */

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

use crate::address::AddressStore;
use crate::config::BluetoothConfig;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No valid BT Address to run command")]
    NoAddress,

    #[error("`{command}` failed: {source}")]
    Command {
        command: String,
        #[source]
        source: RunError,
    },
}

impl BridgeError {
    /// Text handed back to HTTP clients: stderr for failed commands.
    pub fn output(&self) -> String {
        match self {
            BridgeError::Command {
                source: RunError::Failed { stderr, .. },
                ..
            } => stderr.clone(),
            other => other.to_string(),
        }
    }
}

/// Executes a program with arguments and returns its stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, RunError>;
}

/// Production runner backed by `tokio::process`.
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<String, RunError> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(RunError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }
}

/// Object a bus call is addressed to, relative to the active device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTarget {
    Device,
    Player,
}

#[derive(Debug, Clone)]
pub struct DbusCall {
    pub target: BusTarget,
    pub method: String,
    pub args: Vec<String>,
    /// Keep the reply out of the debug log
    pub quiet: bool,
}

impl DbusCall {
    pub fn new(target: BusTarget, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
            args: Vec::new(),
            quiet: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

pub struct Bridge {
    runner: Arc<dyn CommandRunner>,
    address: Arc<AddressStore>,
    adapter: String,
    player: String,
}

impl Bridge {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        address: Arc<AddressStore>,
        config: &BluetoothConfig,
    ) -> Self {
        Self {
            runner,
            address,
            adapter: config.adapter.clone(),
            player: config.player.clone(),
        }
    }

    pub fn address_store(&self) -> &Arc<AddressStore> {
        &self.address
    }

    /// Object path for `target` on the device at `address`.
    pub fn object_path(&self, address: &str, target: BusTarget) -> String {
        let device = format!("/org/bluez/{}/dev_{}", self.adapter, address);
        match target {
            BusTarget::Device => device,
            BusTarget::Player => format!("{}/{}", device, self.player),
        }
    }

    /// Send a method call to BlueZ on the system bus. Fails without spawning
    /// anything while no device address is bound.
    pub async fn dbus_send(&self, call: &DbusCall) -> Result<String, BridgeError> {
        let address = self.address.address().await;
        if address.is_empty() {
            tracing::warn!("No valid BT Address to run command");
            return Err(BridgeError::NoAddress);
        }

        let mut args = vec![
            "--system".to_string(),
            "--type=method_call".to_string(),
            "--dest=org.bluez".to_string(),
            "--print-reply".to_string(),
            self.object_path(&address, call.target),
            call.method.clone(),
        ];
        args.extend(call.args.iter().cloned());

        self.run("dbus-send", &args, call.quiet).await
    }

    /// Run any program, bypassing the address check.
    pub async fn run(&self, program: &str, args: &[String], quiet: bool) -> Result<String, BridgeError> {
        let command = format!("{} {}", program, args.join(" "));
        tracing::debug!("Running: {}", command);

        match self.runner.run(program, args).await {
            Ok(output) => {
                if !quiet {
                    tracing::debug!("{}", output);
                }
                Ok(output)
            }
            Err(source) => {
                match &source {
                    RunError::Failed { stderr, .. } => {
                        tracing::error!("Command failed: {}\n{}", command, stderr)
                    }
                    RunError::Spawn(e) => tracing::error!("Could not start {}: {}", command, e),
                }
                Err(BridgeError::Command { command, source })
            }
        }
    }
}

#[cfg(test)]
pub use mock::MockRunner;

#[cfg(test)]
mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Records invocations and replays preset responses in order. Once the
    /// queue is drained every call succeeds with empty output.
    #[derive(Default)]
    pub struct MockRunner {
        responses: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_responses(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn push_response(&self, response: Result<String, String>) {
            self.responses.lock().unwrap().push_back(response);
        }

        /// Every call as `[program, args...]`.
        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for MockRunner {
        async fn run(&self, program: &str, args: &[String]) -> Result<String, RunError> {
            let mut call = vec![program.to_string()];
            call.extend(args.iter().cloned());
            self.calls.lock().unwrap().push(call);

            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(out)) => Ok(out),
                Some(Err(stderr)) => Err(RunError::Failed {
                    code: Some(1),
                    stderr,
                }),
                None => Ok(String::new()),
            }
        }
    }
}
