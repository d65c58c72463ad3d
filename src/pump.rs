//! The frame pump: a dedicated thread that pulls chunks, assembles frames, and feeds the
//! decoder and sink.
//!
//! Each pull blocks up to the transfer timeout, so the loop must never run on a UI or event
//! thread. Stopping is cooperative: the stop token is checked between pulls, and an in-flight
//! pull finishes before the thread exits. The timeout therefore bounds cancellation latency.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use crate::{
    assemble::FrameAssembler,
    decode::{FrameDecoder, DEFAULT_JPEG_QUALITY},
    error::{Action, ResultExt},
    session::{BulkSource, PullOutcome},
    sink::FrameSink,
    Result,
};

pub const DEFAULT_CHUNK_SIZE: usize = 16384;

/// Tunables for one streaming run. Frame dimensions are negotiated out of band and declared
/// here; the frame byte count is derived from them.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    /// Size of the buffer handed to each bulk pull. Independent of the frame size.
    pub chunk_size: usize,
    /// Whether chunks start with UVC payload headers that should be stripped and used for
    /// frame-boundary detection.
    pub payload_headers: bool,
    pub jpeg_quality: u8,
}

impl StreamConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            chunk_size: DEFAULT_CHUNK_SIZE,
            payload_headers: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Why the pump loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// [`PumpHandle::stop`] was called.
    Stopped,
    /// The device went away (or the transfer failed unrecoverably); the session was torn down.
    Disconnected,
}

pub struct FramePump;

impl FramePump {
    /// Spawns the pump thread over `source`.
    ///
    /// Consumes the source, so a second pump can never be started against the same session;
    /// the session is closed when the pump exits and drops it.
    pub fn start<S>(source: S, config: StreamConfig, sink: FrameSink) -> Result<PumpHandle>
    where
        S: BulkSource + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let token = stop.clone();
        let thread = thread::Builder::new()
            .name("uvc-pump".into())
            .spawn(move || run(source, config, sink, token))
            .during(Action::StartingPump)?;

        Ok(PumpHandle { stop, thread })
    }
}

pub struct PumpHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<PumpExit>,
}

impl PumpHandle {
    /// Requests the pump to stop and waits for it to exit.
    ///
    /// Cancellation is cooperative: the current pull completes (bounded by the transfer
    /// timeout) before the flag is observed. After this returns, no further pulls are issued.
    pub fn stop(self) -> Result<PumpExit> {
        self.stop.store(true, Ordering::Release);
        self.thread
            .join()
            .map_err(|_| "pump thread panicked".to_string())
            .during(Action::StoppingPump)
    }
}

fn run<S: BulkSource>(
    mut source: S,
    config: StreamConfig,
    sink: FrameSink,
    stop: Arc<AtomicBool>,
) -> PumpExit {
    let decoder = FrameDecoder::new(config.width, config.height, config.jpeg_quality);
    let mut assembler = FrameAssembler::new(decoder.frame_len(), config.payload_headers);
    let mut buf = vec![0u8; config.chunk_size];

    log::debug!(
        "pump running: {}x{}, {} bytes per frame, {} byte chunks",
        config.width,
        config.height,
        decoder.frame_len(),
        config.chunk_size,
    );

    while !stop.load(Ordering::Acquire) {
        match source.pull(&mut buf) {
            Ok(PullOutcome::Bytes(n)) if n > 0 => {
                if let Some(payload) = assembler.push(&buf[..n]) {
                    match decoder.decode(&payload) {
                        Ok(image) => sink.submit(&image),
                        // Per-frame failure: drop the frame, keep pumping.
                        Err(e) => log::warn!("dropping undecodable frame: {}", e),
                    }
                }
            }
            Ok(PullOutcome::Bytes(_)) | Ok(PullOutcome::Timeout) => {}
            Ok(PullOutcome::Disconnected) => {
                log::warn!("device disconnected, stopping stream");
                return PumpExit::Disconnected;
            }
            Err(e) => {
                log::error!("unrecoverable transfer error, stopping stream: {}", e);
                return PumpExit::Disconnected;
            }
        }
    }

    log::debug!("pump stop requested, exiting");
    PumpExit::Stopped
    // `source` drops here, closing the session.
}
