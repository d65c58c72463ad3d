use std::{fmt, io};

pub struct Error {
    action: Option<Action>,
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn with_action(kind: impl Into<ErrorKind>, action: Action) -> Self {
        Self {
            action: Some(action),
            kind: kind.into(),
        }
    }

    /// Returns `true` if this error wraps a USB transfer timeout.
    pub fn is_usb_timeout(&self) -> bool {
        matches!(&self.kind, ErrorKind::Rusb(rusb::Error::Timeout))
    }

    /// Returns `true` if this error means USB access to the device was refused by the user or
    /// the OS. Terminal for the device; retrying without user action will not succeed.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::PermissionDenied | ErrorKind::Rusb(rusb::Error::Access)
        )
    }

    /// Returns `true` if this error indicates the device went away.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::Rusb(rusb::Error::NoDevice) | ErrorKind::Rusb(rusb::Error::Pipe)
        )
    }

    /// Returns `true` if this is a per-frame decode failure (the frame can be dropped and the
    /// stream continued).
    pub fn is_decode_failure(&self) -> bool {
        matches!(&self.kind, ErrorKind::Decode(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(action) = &self.action {
            write!(f, "error while {}: ", action)?;
        }

        match &self.kind {
            ErrorKind::Rusb(e) => write!(f, "{}", e),
            ErrorKind::Io(e) => write!(f, "{}", e),
            ErrorKind::Decode(e) => write!(f, "frame decode failed: {}", e),
            ErrorKind::PermissionDenied => write!(f, "USB device permission denied"),
            ErrorKind::Other(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Rusb(rusb::Error),
    Io(io::Error),
    /// A frame payload could not be turned into an image. Lower-level faults from the image
    /// pipeline are wrapped here so callers see one uniform "drop this frame" condition.
    Decode(Box<dyn std::error::Error + Send + Sync>),
    PermissionDenied,
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ErrorKind {
    fn from(v: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(v)
    }
}

impl From<String> for ErrorKind {
    fn from(s: String) -> Self {
        Self::Other(s.into())
    }
}

impl From<&'_ str> for ErrorKind {
    fn from(s: &str) -> Self {
        Self::Other(s.into())
    }
}

impl From<rusb::Error> for ErrorKind {
    fn from(e: rusb::Error) -> Self {
        Self::Rusb(e)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<image::ImageError> for ErrorKind {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e.into())
    }
}

pub(crate) fn decode_err(msg: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> ErrorKind {
    ErrorKind::Decode(msg.into())
}

/// A list of actions during which this library might encounter errors.
#[derive(Debug)]
pub(crate) enum Action {
    AccessingDeviceDescriptor,
    EnumeratingDevices,
    RequestingPermission,
    OpeningDevice,
    ClaimingInterface,
    StreamRead,
    DecodingFrame,
    StartingPump,
    StoppingPump,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::AccessingDeviceDescriptor => "accessing device descriptor",
            Action::EnumeratingDevices => "enumerating USB devices",
            Action::RequestingPermission => "requesting device permission",
            Action::OpeningDevice => "opening UVC device",
            Action::ClaimingInterface => "claiming streaming interface",
            Action::StreamRead => "reading from the video stream",
            Action::DecodingFrame => "decoding a video frame",
            Action::StartingPump => "starting the frame pump",
            Action::StoppingPump => "stopping the frame pump",
        };
        f.write_str(s)
    }
}

pub(crate) trait ResultExt<T, E> {
    fn during(self, action: Action) -> Result<T, Error>;
}

impl<T, E: Into<ErrorKind>> ResultExt<T, E> for Result<T, E> {
    fn during(self, action: Action) -> Result<T, Error> {
        self.map_err(|e| Error::with_action(e, action))
    }
}

pub(crate) fn err<T>(err: impl Into<ErrorKind>, action: Action) -> Result<T, Error> {
    Err(Error::with_action(err, action))
}
