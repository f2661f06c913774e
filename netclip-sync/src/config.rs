use std::{
    net::{Ipv4Addr, SocketAddrV4},
    num::NonZeroUsize,
    time::Duration,
};

use clap::Parser;
use netclip_core::{
    DEFAULT_DISPLAY_WIDTH, DEFAULT_ECHO_WINDOW, DEFAULT_MAX_HISTORY_COUNT,
    DEFAULT_MULTICAST_ADDRESS, DEFAULT_POLL_INTERVAL, DEFAULT_PORT,
};
use thiserror::Error;

use crate::{
    clipboard::ClipboardSelection,
    engine::{EngineSettings, SyncModes},
    service::ServiceOptions,
};

const MAX_ECHO_WINDOW_MS: u64 = 60_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid multicast address {0:?}: expected an IPv4 address")]
    InvalidAddress(String),
    #[error("{0} is not a multicast address (expected 224.0.0.0/4)")]
    NotMulticast(Ipv4Addr),
    #[error("port must be between 1 and 65535")]
    InvalidPort,
    #[error("history count must be at least 1")]
    InvalidHistoryCount,
    #[error("display width must be at least 1")]
    InvalidWidth,
    #[error("poll interval must be at least 1 ms")]
    InvalidPollInterval,
    #[error("echo window must not exceed {} ms", MAX_ECHO_WINDOW_MS)]
    InvalidEchoWindow,
    #[error("multicast TTL must be between 1 and 255")]
    InvalidTtl,
}

/// netclip - a network clipboard sharing application
#[derive(Parser, Debug, Clone)]
#[command(name = "netclip", version)]
pub struct SyncArgs {
    /// Automatically send new clipboard content
    #[arg(short = 's', long, default_value_t = false)]
    pub autosend: bool,

    /// Automatically apply shared clipboard content received from peers
    #[arg(short = 'r', long, default_value_t = false)]
    pub autoreceive: bool,

    /// Use the PRIMARY selection ("middle click") instead of CLIPBOARD ("Ctrl+V")
    #[arg(short = 'P', long = "primary", default_value_t = false)]
    pub use_secondary_selection: bool,

    /// Multicast address to listen on and to send clips to
    #[arg(short = 'a', long, default_value = DEFAULT_MULTICAST_ADDRESS)]
    pub address: String,

    /// Multicast port to use
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Maximum clip history items count to store
    #[arg(short = 'c', long = "count", default_value_t = DEFAULT_MAX_HISTORY_COUNT)]
    pub max_history_count: usize,

    /// Limit clip history items width to show this many characters
    #[arg(short = 'w', long = "width", default_value_t = DEFAULT_DISPLAY_WIDTH)]
    pub display_width_limit: usize,

    /// Use the numbered legacy menu instead of the status indicator
    #[arg(short = 'n', long = "legacy-menu", alias = "noappint", default_value_t = false)]
    pub legacy_presentation_mode: bool,

    /// How often the clipboard is polled for local changes
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// How long a sent or applied clip is ignored when it echoes back
    #[arg(long, default_value_t = DEFAULT_ECHO_WINDOW.as_millis() as u64)]
    pub echo_window_ms: u64,

    /// Multicast TTL; 1 keeps clips on the local segment
    #[arg(long, default_value_t = 1)]
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub modes: SyncModes,
    pub selection: ClipboardSelection,
    pub group: Ipv4Addr,
    pub port: u16,
    pub max_history_count: NonZeroUsize,
    pub display_width_limit: usize,
    pub legacy_presentation_mode: bool,
    pub poll_interval: Duration,
    pub echo_window: Duration,
    pub multicast_ttl: u32,
}

impl SyncArgs {
    pub fn validate(&self) -> Result<SyncConfig, ConfigError> {
        let group: Ipv4Addr = self
            .address
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.address.clone()))?;
        if !group.is_multicast() {
            return Err(ConfigError::NotMulticast(group));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        let max_history_count =
            NonZeroUsize::new(self.max_history_count).ok_or(ConfigError::InvalidHistoryCount)?;
        if self.display_width_limit == 0 {
            return Err(ConfigError::InvalidWidth);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }
        if self.echo_window_ms > MAX_ECHO_WINDOW_MS {
            return Err(ConfigError::InvalidEchoWindow);
        }
        if self.ttl == 0 || self.ttl > 255 {
            return Err(ConfigError::InvalidTtl);
        }

        Ok(SyncConfig {
            modes: SyncModes {
                autosend: self.autosend,
                autoreceive: self.autoreceive,
            },
            selection: ClipboardSelection::from_use_secondary(self.use_secondary_selection),
            group,
            port: self.port,
            max_history_count,
            display_width_limit: self.display_width_limit,
            legacy_presentation_mode: self.legacy_presentation_mode,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            echo_window: Duration::from_millis(self.echo_window_ms),
            multicast_ttl: self.ttl,
        })
    }
}

impl SyncConfig {
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_history_count: self.max_history_count,
            echo_window: self.echo_window,
            modes: self.modes,
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            poll_interval: self.poll_interval,
            display_width_limit: self.display_width_limit,
        }
    }
}
