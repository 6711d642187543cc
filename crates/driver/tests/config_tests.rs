//! Integration tests for configuration files
//!
//! Covers:
//! - Full and minimal driver config files
//! - Save then load through the filesystem
//! - Invalid configuration handling

use driver::config::{DriverConfig, OutputFormat, PadMode, load_config};
use std::fs;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[driver]
log_level = "debug"
log_format = "compact"

[device]
vendor_id = "0x06d3"
product_id = "0x0f10"
interface = 0

[transfers]
control_timeout_ms = 250
interrupt_slice_ms = 20

[mapping]
pad1 = "axes"
pad2 = "buttons"
report_mode_select = true

[output]
format = "json"
queue_capacity = 32
"#;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("driver.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    let config = DriverConfig::load(Some(path)).unwrap();

    assert_eq!(config.driver.log_level, "debug");
    assert_eq!(config.vendor_id().unwrap(), 0x06d3);
    assert_eq!(config.transfers.control_timeout_ms, 250);
    assert_eq!(config.mapping.pad1, PadMode::Axes);
    assert_eq!(config.mapping.pad2, PadMode::Buttons);
    assert!(config.mapping.report_mode_select);
    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(config.output.queue_capacity, 32);

    let timeouts = config.transfers.timeouts();
    assert_eq!(timeouts.control.as_millis(), 250);
    assert_eq!(timeouts.interrupt_slice.as_millis(), 20);
}

#[test]
fn test_empty_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = DriverConfig::load(Some(path)).unwrap();

    assert_eq!(config.driver.log_level, "info");
    assert_eq!(config.product_id().unwrap(), 0x0f10);
    assert_eq!(config.mapping.pad2, PadMode::Axes);
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("driver.toml");

    let mut config = DriverConfig::default();
    config.mapping.pad1 = PadMode::Axes;
    config.output.format = OutputFormat::Json;
    config.save(&path).unwrap();

    let loaded = load_config(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.mapping, config.mapping);
    assert_eq!(loaded.output.format, OutputFormat::Json);
}

#[test]
fn test_invalid_configs_are_rejected() {
    let dir = TempDir::new().unwrap();

    let cases = [
        "[driver]\nlog_level = \"loud\"\n",
        "[device]\nvendor_id = \"06d3\"\nproduct_id = \"0x0f10\"\n",
        "[transfers]\ncontrol_timeout_ms = 0\n",
        "[output]\nqueue_capacity = 0\n",
        "[mapping]\npad1 = \"diagonal\"\n",
        "not toml at all [",
    ];

    for content in cases {
        let path = write_config(&dir, content);
        assert!(
            DriverConfig::load(Some(path)).is_err(),
            "accepted: {}",
            content
        );
    }
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(DriverConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}
