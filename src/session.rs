//! Exclusive streaming sessions.
//!
//! A [`DeviceSession`] owns the open connection to one device and the claim on its streaming
//! interface. Ownership enforces the "at most one live connection per device" rule: opening
//! consumes the device descriptor, and the claim is released when the session closes or drops.

use std::time::Duration;

use rusb::{Context, DeviceHandle};

use crate::{
    detect::EndpointSpec,
    error::{Action, ResultExt},
    BulkUvcDeviceDesc, Result,
};

/// Result of a single bulk pull, with disconnects distinguished from timeouts so the pump can
/// act on them instead of retrying forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The transfer completed and filled this many bytes of the buffer.
    Bytes(usize),
    /// The transfer timed out with no data. Transient; try again.
    Timeout,
    /// The device is gone. The session is dead and the stream must stop.
    Disconnected,
}

/// Source of raw stream chunks.
///
/// Implemented by [`DeviceSession`] over a real bulk endpoint, and by test doubles that script
/// a sequence of outcomes.
pub trait BulkSource {
    fn pull(&mut self, buf: &mut [u8]) -> Result<PullOutcome>;
}

/// Claim and transfer primitives of one open device connection.
///
/// [`DeviceSession`] drives this instead of `rusb::DeviceHandle` directly so the
/// claim-failure and close paths can be exercised without hardware. Dropping an
/// implementation closes the underlying connection.
pub trait UsbLink {
    fn claim_interface(&self, iface: u8) -> rusb::Result<()>;
    fn release_interface(&self, iface: u8) -> rusb::Result<()>;
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

impl UsbLink for DeviceHandle<Context> {
    fn claim_interface(&self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::claim_interface(self, iface)
    }

    fn release_interface(&self, iface: u8) -> rusb::Result<()> {
        DeviceHandle::release_interface(self, iface)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }
}

#[derive(Debug)]
pub struct DeviceSession<L: UsbLink = DeviceHandle<Context>> {
    usb: Option<L>,
    endpoint: EndpointSpec,
    timeout: Duration,
}

impl DeviceSession {
    /// Opens the device and claims its streaming interface.
    ///
    /// Claiming uses force semantics: a kernel driver holding the interface is detached first.
    pub fn open(desc: BulkUvcDeviceDesc) -> Result<Self> {
        let endpoint = desc.endpoint_spec();
        let usb = desc.usb.open().during(Action::OpeningDevice)?;
        if let Err(e) = usb.set_auto_detach_kernel_driver(true) {
            log::warn!("set_auto_detach_kernel_driver failed: {}", e);
        }

        Self::claim(usb, endpoint)
    }
}

impl<L: UsbLink> DeviceSession<L> {
    /// Claims the streaming interface over an already-open connection.
    ///
    /// If the claim fails the connection is released before the error surfaces, so a failed
    /// open never leaks an exclusive handle.
    fn claim(usb: L, endpoint: EndpointSpec) -> Result<Self> {
        if let Err(e) = usb.claim_interface(endpoint.interface) {
            // Dropping the link closes the connection; no half-open state survives.
            drop(usb);
            return Err(e).during(Action::ClaimingInterface);
        }

        log::debug!(
            "session open: interface {}, endpoint {:#04x}",
            endpoint.interface,
            endpoint.endpoint_address
        );

        Ok(DeviceSession {
            usb: Some(usb),
            endpoint,
            timeout: Duration::from_millis(1000),
        })
    }

    pub fn endpoint(&self) -> EndpointSpec {
        self.endpoint
    }

    /// Releases the claimed interface and the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(usb) = self.usb.take() {
            if let Err(e) = usb.release_interface(self.endpoint.interface) {
                log::warn!("release_interface failed: {}", e);
            }
        }
    }
}

impl<L: UsbLink> Drop for DeviceSession<L> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<L: UsbLink> BulkSource for DeviceSession<L> {
    fn pull(&mut self, buf: &mut [u8]) -> Result<PullOutcome> {
        let usb = match &self.usb {
            Some(usb) => usb,
            None => return Ok(PullOutcome::Disconnected),
        };

        match usb.read_bulk(self.endpoint.endpoint_address, buf, self.timeout) {
            Ok(n) => Ok(PullOutcome::Bytes(n)),
            Err(e) => classify_pull_error(e),
        }
    }
}

/// Maps a failed bulk read onto the tagged outcome the pump dispatches on.
///
/// Timeouts are transient. `NoDevice`, `Pipe` and `Io` mean the device went away (or the pipe
/// is unrecoverable without it); anything else is a hard error surfaced to the caller.
fn classify_pull_error(e: rusb::Error) -> Result<PullOutcome> {
    match e {
        rusb::Error::Timeout => Ok(PullOutcome::Timeout),
        rusb::Error::NoDevice | rusb::Error::Pipe | rusb::Error::Io => {
            Ok(PullOutcome::Disconnected)
        }
        other => Err(other).during(Action::StreamRead),
    }
}
