//! Device permission negotiation.
//!
//! The OS permission service is an external collaborator: it knows whether the process may open
//! a device and delivers grant/deny results asynchronously. [`PermissionGate`] wraps that
//! exchange in an explicit state machine so that at most one request is ever in flight and the
//! result callback cannot race the request.

use crate::{
    error::{err, Action, ErrorKind},
    Result,
};

/// The OS-side USB permission boundary.
///
/// `request_permission` is expected to deliver its result asynchronously; the embedding glue
/// forwards that result to [`PermissionGate::resolve`].
pub trait UsbAccess {
    fn has_permission(&self) -> bool;
    fn request_permission(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unknown,
    Pending,
    Granted,
    Denied,
}

/// Outcome of a permission check: either the device is usable now, or a request is in flight
/// and the caller must wait for [`PermissionGate::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Granted,
    Pending,
}

pub struct PermissionGate {
    state: GateState,
}

impl PermissionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Unknown,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Checks whether access is already held and, if not, issues a single permission request.
    ///
    /// While a request is pending, repeated calls return [`GateOutcome::Pending`] without
    /// issuing another request, so the result listener is registered at most once. A denied
    /// gate stays denied; there is no automatic retry.
    pub fn check_or_request(&mut self, access: &impl UsbAccess) -> Result<GateOutcome> {
        match self.state {
            GateState::Granted => Ok(GateOutcome::Granted),
            GateState::Pending => Ok(GateOutcome::Pending),
            GateState::Denied => err(ErrorKind::PermissionDenied, Action::RequestingPermission),
            GateState::Unknown => {
                if access.has_permission() {
                    self.state = GateState::Granted;
                    return Ok(GateOutcome::Granted);
                }

                // The state moves to Pending before the request goes out, so a result that
                // arrives immediately still finds the gate listening.
                self.state = GateState::Pending;
                access.request_permission();
                log::debug!("USB permission request issued");
                Ok(GateOutcome::Pending)
            }
        }
    }

    /// Delivers the asynchronous grant/deny result for the in-flight request.
    ///
    /// Calling this without a pending request is an error; results cannot be injected into a
    /// gate that never asked for one.
    pub fn resolve(&mut self, granted: bool) -> Result<()> {
        if self.state != GateState::Pending {
            return err(
                format!("permission result delivered in state {:?}", self.state),
                Action::RequestingPermission,
            );
        }

        if granted {
            log::debug!("USB permission granted");
            self.state = GateState::Granted;
            Ok(())
        } else {
            log::warn!("USB permission denied by user");
            self.state = GateState::Denied;
            err(ErrorKind::PermissionDenied, Action::RequestingPermission)
        }
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeAccess {
        granted: bool,
        requests: Cell<usize>,
    }

    impl FakeAccess {
        fn new(granted: bool) -> Self {
            Self {
                granted,
                requests: Cell::new(0),
            }
        }
    }

    impl UsbAccess for FakeAccess {
        fn has_permission(&self) -> bool {
            self.granted
        }

        fn request_permission(&self) {
            self.requests.set(self.requests.get() + 1);
        }
    }

    #[test]
    fn granted_without_request_when_access_already_held() {
        let access = FakeAccess::new(true);
        let mut gate = PermissionGate::new();
        assert_eq!(gate.check_or_request(&access).unwrap(), GateOutcome::Granted);
        assert_eq!(access.requests.get(), 0);
    }

    #[test]
    fn repeated_checks_issue_at_most_one_request() {
        let access = FakeAccess::new(false);
        let mut gate = PermissionGate::new();

        for _ in 0..5 {
            assert_eq!(gate.check_or_request(&access).unwrap(), GateOutcome::Pending);
        }
        assert_eq!(access.requests.get(), 1);

        gate.resolve(true).unwrap();
        assert_eq!(gate.check_or_request(&access).unwrap(), GateOutcome::Granted);
        assert_eq!(access.requests.get(), 1);
    }

    #[test]
    fn denial_is_terminal() {
        let access = FakeAccess::new(false);
        let mut gate = PermissionGate::new();
        gate.check_or_request(&access).unwrap();

        let e = gate.resolve(false).unwrap_err();
        assert!(e.is_permission_denied());
        assert_eq!(gate.state(), GateState::Denied);

        // No retry: subsequent checks fail without a new request.
        let e = gate.check_or_request(&access).unwrap_err();
        assert!(e.is_permission_denied());
        assert_eq!(access.requests.get(), 1);
    }

    #[test]
    fn result_without_pending_request_is_rejected() {
        let mut gate = PermissionGate::new();
        assert!(gate.resolve(true).is_err());
        assert_eq!(gate.state(), GateState::Unknown);
    }
}
