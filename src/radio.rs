//! Radio interface control via wireless-tools commands
//!
//! Monitor mode and channel changes are done by running `iwconfig` (and
//! `ifconfig` for the down/up fallback), the same way the interface would be
//! configured by hand.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::scheduler::Channel;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: ExitStatus },
}

/// Puts an interface into monitor mode and tunes it
pub trait RadioController {
    /// Any error here is fatal to the capture.
    fn enter_monitor_mode(&mut self, interface: &str) -> Result<(), RadioError>;

    /// Best effort; the caller logs failures and keeps going.
    fn set_channel(&mut self, interface: &str, channel: Channel) -> Result<(), RadioError>;
}

/// `RadioController` that shells out to `iwconfig` / `ifconfig`
pub struct IwconfigRadio {
    iwconfig_path: PathBuf,
    ifconfig_path: PathBuf,
}

impl IwconfigRadio {
    pub fn new(iwconfig_path: impl Into<PathBuf>, ifconfig_path: impl Into<PathBuf>) -> Self {
        Self {
            iwconfig_path: iwconfig_path.into(),
            ifconfig_path: ifconfig_path.into(),
        }
    }

    fn iwconfig(&self, args: &[&str]) -> Result<(), RadioError> {
        run_command(&self.iwconfig_path, args)
    }

    fn ifconfig(&self, args: &[&str]) -> Result<(), RadioError> {
        run_command(&self.ifconfig_path, args)
    }
}

impl RadioController for IwconfigRadio {
    fn enter_monitor_mode(&mut self, interface: &str) -> Result<(), RadioError> {
        match self.iwconfig(&[interface, "mode", "monitor"]) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Some drivers refuse the mode change while the link is up
                debug!("{}; retrying with the interface taken down", e);
                self.ifconfig(&[interface, "down"])?;
                self.iwconfig(&[interface, "mode", "monitor"])?;
                self.ifconfig(&[interface, "up"])?;
                Ok(())
            }
        }
    }

    fn set_channel(&mut self, interface: &str, channel: Channel) -> Result<(), RadioError> {
        self.iwconfig(&[interface, "channel", &channel.to_string()])
    }
}

/// Run a command to completion, discarding its output
fn run_command(program: &Path, args: &[&str]) -> Result<(), RadioError> {
    let command = format!("{} {}", program.display(), args.join(" "));
    debug!("Executing: {}", command);

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| RadioError::Spawn {
            command: command.clone(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        info!("`{}` exited with {}", command, status);
        Err(RadioError::Failed { command, status })
    }
}
