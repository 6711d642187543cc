//! Driver configuration management

use anyhow::{Context, Result, anyhow};
use common::{DEFAULT_QUEUE_CAPACITY, LogFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::usb::TransferTimeouts;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: DriverSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub transfers: TransferSettings,
    /// How pads and the mode selector are reported
    #[serde(default)]
    pub mapping: MappingSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSettings {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Which USB device to drive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Vendor id, e.g. "0x06d3"
    pub vendor_id: String,
    /// Product id, e.g. "0x0f10"
    pub product_id: String,
    /// Interface number to claim
    #[serde(default)]
    pub interface: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: format!("0x{:04x}", protocol::VENDOR_ID),
            product_id: format!("0x{:04x}", protocol::PRODUCT_ID),
            interface: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Timeout of each vendor poll request
    #[serde(default = "TransferSettings::default_control_timeout")]
    pub control_timeout_ms: u64,
    /// Length of one blocking interrupt read before the worker rechecks for
    /// cancellation
    #[serde(default = "TransferSettings::default_interrupt_slice")]
    pub interrupt_slice_ms: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            control_timeout_ms: Self::default_control_timeout(),
            interrupt_slice_ms: Self::default_interrupt_slice(),
        }
    }
}

impl TransferSettings {
    fn default_control_timeout() -> u64 {
        1000
    }

    fn default_interrupt_slice() -> u64 {
        50
    }

    pub fn timeouts(&self) -> TransferTimeouts {
        TransferTimeouts {
            control: Duration::from_millis(self.control_timeout_ms),
            interrupt_slice: Duration::from_millis(self.interrupt_slice_ms),
        }
    }
}

/// How a four-way pad is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadMode {
    /// One button per direction
    Buttons,
    /// Two ternary axes (0 = low edge, 1 = center, 2 = high edge)
    Axes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSettings {
    #[serde(default = "MappingSettings::default_pad1")]
    pub pad1: PadMode,
    #[serde(default = "MappingSettings::default_pad2")]
    pub pad2: PadMode,
    /// Publish the M1/M2/M3 selector as buttons
    #[serde(default)]
    pub report_mode_select: bool,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            pad1: Self::default_pad1(),
            pad2: Self::default_pad2(),
            report_mode_select: false,
        }
    }
}

impl MappingSettings {
    fn default_pad1() -> PadMode {
        PadMode::Buttons
    }

    fn default_pad2() -> PadMode {
        PadMode::Axes
    }
}

/// How frames are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,
    /// Frames buffered between the completion context and the printer
    #[serde(default = "OutputSettings::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl OutputSettings {
    fn default_queue_capacity() -> usize {
        DEFAULT_QUEUE_CAPACITY
    }
}

impl DriverConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/hori-flightstick/driver.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: DriverConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("hori-flightstick").join("driver.toml")
        } else {
            PathBuf::from(".config/hori-flightstick/driver.toml")
        }
    }

    /// Parsed vendor id
    pub fn vendor_id(&self) -> Result<u16> {
        Self::parse_hex_id(&self.device.vendor_id, "VID")
    }

    /// Parsed product id
    pub fn product_id(&self) -> Result<u16> {
        Self::parse_hex_id(&self.device.product_id, "PID")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.driver.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.driver.log_level,
                valid_levels.join(", ")
            ));
        }

        self.vendor_id()?;
        self.product_id()?;

        if self.transfers.control_timeout_ms == 0 {
            return Err(anyhow!("control_timeout_ms must be greater than 0"));
        }
        if self.transfers.interrupt_slice_ms == 0 {
            return Err(anyhow!("interrupt_slice_ms must be greater than 0"));
        }
        if self.output.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be greater than 0"));
        }

        Ok(())
    }

    /// Parse a hex ID (VID or PID)
    fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
        if !id.starts_with("0x") && !id.starts_with("0X") {
            return Err(anyhow!(
                "Invalid {} '{}', must start with '0x' (e.g., '0x1234')",
                name,
                id
            ));
        }

        let hex_part = &id[2..];
        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(anyhow!(
                "Invalid {} '{}', hex part must be 1-4 digits",
                name,
                id
            ));
        }

        u16::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
    }
}

/// Load configuration from a user supplied path, expanding `~`
pub fn load_config(path: &str) -> Result<DriverConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    DriverConfig::load(Some(path_buf))
}
