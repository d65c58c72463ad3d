//! Frame acquisition from bulk-transfer UVC devices.
//!
//! The pipeline: [`list`] finds devices exposing a bulk video streaming endpoint,
//! [`PermissionGate`] resolves USB access, [`DeviceSession`] opens and claims the streaming
//! interface, [`FramePump`] pulls chunks on a dedicated thread and assembles frames, and each
//! frame runs through the NV21-to-JPEG-to-RGB decoder before [`FrameSink`] hands it to the
//! presentation surface.
//!
//! [`PermissionGate`]: permission::PermissionGate
//! [`DeviceSession`]: session::DeviceSession
//! [`FramePump`]: pump::FramePump
//! [`FrameSink`]: sink::FrameSink

pub mod assemble;
pub mod decode;
mod detect;
mod error;
pub mod permission;
pub mod pump;
pub mod session;
pub mod sink;
mod util;

use std::fmt;

use detect::BulkUvcInfo;
pub use detect::EndpointSpec;
pub use error::Error;
use error::*;
use rusb::{Context, Device, UsbContext};
use session::DeviceSession;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Identifies a bulk-variant UVC device that has not been opened yet.
pub struct BulkUvcDeviceDesc {
    pub(crate) usb: Device<Context>,
    info: BulkUvcInfo,
}

impl BulkUvcDeviceDesc {
    pub fn vendor_id(&self) -> u16 {
        // unwrap: always succeeds
        self.usb.device_descriptor().unwrap().vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        // unwrap: always succeeds
        self.usb.device_descriptor().unwrap().product_id()
    }

    /// The interface/endpoint pair the video stream uses, read from the device descriptors.
    pub fn endpoint_spec(&self) -> EndpointSpec {
        self.info.endpoint
    }

    /// Format GUID from the streaming interface's format descriptor, when the device declares
    /// one.
    pub fn format_guid(&self) -> Option<Uuid> {
        self.info.format_guid
    }

    pub fn open(self) -> Result<DeviceSession> {
        DeviceSession::open(self)
    }
}

impl fmt::Debug for BulkUvcDeviceDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkUvcDeviceDesc")
            .field("info", &self.info)
            .finish()
    }
}

/// Enumerates attached devices that expose a bulk video streaming endpoint.
pub fn list() -> Result<impl Iterator<Item = BulkUvcDeviceDesc>> {
    let ctx = Context::new().during(Action::EnumeratingDevices)?;
    let list = ctx.devices().during(Action::EnumeratingDevices)?;

    let devices = list
        .iter()
        .filter_map(|dev| match detect::detect_bulk_uvc(&dev) {
            Ok(Some(info)) => Some(BulkUvcDeviceDesc { usb: dev, info }),
            Ok(None) => None,
            Err(e) => {
                log::error!("{:?}: {}", dev, e);
                None
            }
        })
        .collect::<Vec<_>>();

    Ok(devices.into_iter())
}
