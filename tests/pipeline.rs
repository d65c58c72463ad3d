//! Pipeline tests against a scripted device: permission grant through frame delivery, plus
//! the pump's stop and teardown guarantees.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use image::RgbImage;
use uvc_bulk::{
    permission::{GateOutcome, GateState, PermissionGate, UsbAccess},
    pump::{FramePump, PumpExit, StreamConfig},
    session::{BulkSource, PullOutcome},
    sink::{Canvas, FrameSink, Surface},
};

struct GrantingAccess {
    requests: AtomicUsize,
}

impl UsbAccess for GrantingAccess {
    fn has_permission(&self) -> bool {
        false
    }

    fn request_permission(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replays a fixed pull script, then times out forever. Counts every pull.
struct ScriptedDevice {
    script: Mutex<Vec<PullOutcome>>,
    pulls: Arc<AtomicUsize>,
    fill: u8,
}

impl ScriptedDevice {
    fn new(script: Vec<PullOutcome>, pulls: Arc<AtomicUsize>) -> Self {
        Self {
            script: Mutex::new(script),
            pulls,
            fill: 128,
        }
    }
}

impl BulkSource for ScriptedDevice {
    fn pull(&mut self, buf: &mut [u8]) -> uvc_bulk::Result<PullOutcome> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Ok(PullOutcome::Timeout);
        }
        let outcome = script.remove(0);
        if let PullOutcome::Bytes(n) = outcome {
            for b in buf[..n].iter_mut() {
                *b = self.fill;
            }
        }
        Ok(outcome)
    }
}

struct CollectingSurface {
    frames: Mutex<Vec<(u32, u32)>>,
}

struct CollectingCanvas<'a> {
    surface: &'a CollectingSurface,
}

impl Canvas for CollectingCanvas<'_> {
    fn draw_at(&mut self, image: &RgbImage, _x: u32, _y: u32) {
        self.surface.frames.lock().unwrap().push(image.dimensions());
    }

    fn post(self: Box<Self>) {}
}

impl Surface for CollectingSurface {
    fn lock(&self) -> Option<Box<dyn Canvas + '_>> {
        Some(Box::new(CollectingCanvas { surface: self }))
    }
}

fn collecting_sink() -> (Arc<CollectingSurface>, FrameSink) {
    let surface = Arc::new(CollectingSurface {
        frames: Mutex::new(Vec::new()),
    });
    (surface.clone(), FrameSink::new(surface))
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        std::thread::yield_now();
    }
}

#[test]
fn stop_joins_the_loop_and_ends_pulling() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let device = ScriptedDevice::new(Vec::new(), pulls.clone());
    let (_surface, sink) = collecting_sink();

    let handle = FramePump::start(device, StreamConfig::new(10, 8), sink).unwrap();
    wait_for(|| pulls.load(Ordering::SeqCst) >= 3);

    let exit = handle.stop().unwrap();
    assert_eq!(exit, PumpExit::Stopped);

    // After join, the thread is gone: the pull count must not move again.
    let after_join = pulls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(pulls.load(Ordering::SeqCst), after_join);
}

#[test]
fn disconnect_mid_stream_stops_the_pump_after_one_frame() {
    let pulls = Arc::new(AtomicUsize::new(0));
    let device = ScriptedDevice::new(
        vec![
            PullOutcome::Timeout,
            PullOutcome::Timeout,
            PullOutcome::Bytes(120),
            PullOutcome::Disconnected,
        ],
        pulls.clone(),
    );
    let (surface, sink) = collecting_sink();

    // 10x8 NV21 declares a 120-byte frame, so the single 120-byte pull is a whole frame.
    let handle = FramePump::start(device, StreamConfig::new(10, 8), sink).unwrap();
    wait_for(|| pulls.load(Ordering::SeqCst) >= 4);
    assert_eq!(handle.stop().unwrap(), PumpExit::Disconnected);

    assert_eq!(surface.frames.lock().unwrap().as_slice(), &[(10, 8)]);
    // The disconnect ended the loop; nothing pulled past it.
    assert_eq!(pulls.load(Ordering::SeqCst), 4);
}

#[test]
fn granted_permission_then_three_chunks_deliver_exactly_one_frame() {
    // Permission leg: no access initially, a single request, asynchronous grant.
    let access = GrantingAccess {
        requests: AtomicUsize::new(0),
    };
    let mut gate = PermissionGate::new();
    assert_eq!(gate.check_or_request(&access).unwrap(), GateOutcome::Pending);
    assert_eq!(gate.check_or_request(&access).unwrap(), GateOutcome::Pending);
    assert_eq!(access.requests.load(Ordering::SeqCst), 1);

    gate.resolve(true).unwrap();
    assert_eq!(gate.state(), GateState::Granted);

    // Streaming leg: three 96-byte chunks form one 288-byte frame at 16x12.
    let pulls = Arc::new(AtomicUsize::new(0));
    let device = ScriptedDevice::new(
        vec![
            PullOutcome::Bytes(96),
            PullOutcome::Bytes(96),
            PullOutcome::Bytes(96),
        ],
        pulls.clone(),
    );
    let (surface, sink) = collecting_sink();

    let handle = FramePump::start(device, StreamConfig::new(16, 12), sink).unwrap();
    wait_for(|| !surface.frames.lock().unwrap().is_empty());
    assert_eq!(handle.stop().unwrap(), PumpExit::Stopped);

    assert_eq!(surface.frames.lock().unwrap().as_slice(), &[(16, 12)]);
}
