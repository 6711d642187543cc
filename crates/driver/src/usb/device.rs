//! Flightstick device handle
//!
//! Locates the flightstick on the bus, takes the interface away from any
//! kernel driver and finds the interrupt IN endpoint the stream reads from.

use protocol::INTERRUPT_REPORT_LEN;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure to take over the device
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("no device {vendor_id:04x}:{product_id:04x} found")]
    NotFound { vendor_id: u16, product_id: u16 },

    #[error("permission denied opening device, check udev rules")]
    PermissionDenied,

    #[error("interface {0} has no interrupt IN endpoint")]
    NoInterruptEndpoint(u8),

    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),
}

/// Interrupt IN endpoint of the claimed interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEndpoint {
    pub address: u8,
    pub max_packet_size: u16,
    /// Polling interval in frames
    pub interval: u8,
}

impl InterruptEndpoint {
    /// Bytes requested per read: a whole packet, so an oversized report
    /// arrives as a short payload instead of a host overflow
    pub fn read_len(&self) -> usize {
        usize::from(self.max_packet_size).max(INTERRUPT_REPORT_LEN)
    }
}

/// Summary of a matching device on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

/// Opened flightstick with its interface claimed
pub struct FlightstickDevice {
    handle: Arc<DeviceHandle<Context>>,
    interface: u8,
    endpoint: InterruptEndpoint,
    detached_kernel_driver: bool,
}

impl FlightstickDevice {
    /// Open the first device matching `vendor_id:product_id` and claim
    /// `interface`
    pub fn open(
        context: &Context,
        vendor_id: u16,
        product_id: u16,
        interface: u8,
    ) -> Result<Self, OpenError> {
        let device = context
            .devices()?
            .iter()
            .find(|device| matches_ids(device, vendor_id, product_id))
            .ok_or(OpenError::NotFound {
                vendor_id,
                product_id,
            })?;

        let endpoint = find_interrupt_in(&device, interface)?;

        let handle = device.open().map_err(|e| match e {
            rusb::Error::Access => OpenError::PermissionDenied,
            e => OpenError::Usb(e),
        })?;

        let detached_kernel_driver = match handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                handle.detach_kernel_driver(interface)?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
                false
            }
        };

        handle.claim_interface(interface)?;
        info!(
            "Claimed interface {} on bus {:03} device {:03}, interrupt endpoint {:#04x} (maxp {}, interval {})",
            interface,
            device.bus_number(),
            device.address(),
            endpoint.address,
            endpoint.max_packet_size,
            endpoint.interval
        );

        Ok(Self {
            handle: Arc::new(handle),
            interface,
            endpoint,
            detached_kernel_driver,
        })
    }

    /// Matching devices currently on the bus
    pub fn list_matching(
        context: &Context,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Vec<DeviceSummary>, OpenError> {
        let mut found = Vec::new();
        for device in context.devices()?.iter() {
            if !matches_ids(&device, vendor_id, product_id) {
                continue;
            }
            let product = device.device_descriptor().ok().and_then(|descriptor| {
                let handle = device.open().ok()?;
                handle.read_product_string_ascii(&descriptor).ok()
            });
            found.push(DeviceSummary {
                bus_number: device.bus_number(),
                address: device.address(),
                vendor_id,
                product_id,
                product,
            });
        }
        Ok(found)
    }

    /// Shared handle for the transport workers
    pub fn handle(&self) -> Arc<DeviceHandle<Context>> {
        Arc::clone(&self.handle)
    }

    pub fn interrupt_endpoint(&self) -> InterruptEndpoint {
        self.endpoint
    }

    /// Port reset; the session must be inside its reset window
    pub fn reset(&self) -> Result<(), rusb::Error> {
        self.handle.reset()?;
        debug!("Reset device");
        Ok(())
    }
}

impl Drop for FlightstickDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }

        if self.detached_kernel_driver {
            if let Err(e) = self.handle.attach_kernel_driver(self.interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    self.interface, e
                );
            } else {
                debug!("Reattached kernel driver to interface {}", self.interface);
            }
        }
    }
}

fn matches_ids(device: &Device<Context>, vendor_id: u16, product_id: u16) -> bool {
    device
        .device_descriptor()
        .map(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
        .unwrap_or(false)
}

/// First interrupt IN endpoint of `interface` in the active configuration
fn find_interrupt_in(
    device: &Device<Context>,
    interface: u8,
) -> Result<InterruptEndpoint, OpenError> {
    let config = device.active_config_descriptor()?;

    for iface in config.interfaces().filter(|i| i.number() == interface) {
        for setting in iface.descriptors() {
            let found = setting.endpoint_descriptors().find(|ep| {
                ep.transfer_type() == TransferType::Interrupt && ep.direction() == Direction::In
            });
            if let Some(ep) = found {
                return Ok(InterruptEndpoint {
                    address: ep.address(),
                    max_packet_size: ep.max_packet_size(),
                    interval: ep.interval(),
                });
            }
        }
    }

    Err(OpenError::NoInterruptEndpoint(interface))
}
