use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use uvc_bulk::{
    pump::{FramePump, StreamConfig},
    sink::{Canvas, FrameSink, Surface},
};

/// Stand-in surface that reports delivered frames instead of drawing them.
struct ConsoleSurface;

struct ConsoleCanvas;

impl Canvas for ConsoleCanvas {
    fn draw_at(&mut self, image: &RgbImage, x: u32, y: u32) {
        let (w, h) = image.dimensions();
        println!("frame {}x{} at ({}, {})", w, h, x, y);
    }

    fn post(self: Box<Self>) {}
}

impl Surface for ConsoleSurface {
    fn lock(&self) -> Option<Box<dyn Canvas + '_>> {
        Some(Box::new(ConsoleCanvas))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let desc = match uvc_bulk::list()?.next() {
        Some(desc) => desc,
        None => {
            eprintln!("no bulk UVC devices found");
            return Ok(());
        }
    };

    println!(
        "device {:04x}:{:04x}, endpoint {:?}, format {:?}",
        desc.vendor_id(),
        desc.product_id(),
        desc.endpoint_spec(),
        desc.format_guid(),
    );

    let session = desc.open()?;

    let mut config = StreamConfig::new(640, 480);
    config.payload_headers = true;
    let sink = FrameSink::new(Arc::new(ConsoleSurface));
    let pump = FramePump::start(session, config, sink)?;

    println!("streaming for 10 seconds");
    std::thread::sleep(Duration::from_secs(10));

    let exit = pump.stop()?;
    println!("pump exited: {:?}", exit);
    Ok(())
}
