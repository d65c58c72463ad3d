//! Frame decoding.
//!
//! Payloads arrive as NV21 semi-planar YUV: a full-resolution luma plane followed by one
//! interleaved VU plane at quarter resolution. Decoding converts to RGB with BT.601
//! coefficients, re-encodes the full visible rectangle as JPEG at the configured quality, and
//! decodes that back into the pixel buffer handed to the sink.
//!
//! Every failure along the way surfaces as a decode failure so the pump can apply one uniform
//! "drop this frame, keep pumping" policy.

use image::{codecs::jpeg::JpegEncoder, ImageFormat, RgbImage};

use crate::{
    error::{decode_err, err, Action, ResultExt},
    Result,
};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

pub struct FrameDecoder {
    width: u32,
    height: u32,
    quality: u8,
}

impl FrameDecoder {
    /// Dimensions are externally known (negotiated out of band), not derived from the payload.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
        }
    }

    /// Byte count of one complete NV21 payload at the configured dimensions.
    pub fn frame_len(&self) -> usize {
        let w = self.width as usize;
        let h = self.height as usize;
        w * h + (w / 2) * (h / 2) * 2
    }

    pub fn decode(&self, payload: &[u8]) -> Result<RgbImage> {
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return err(
                decode_err(format!(
                    "NV21 requires even dimensions, got {}x{}",
                    self.width, self.height
                )),
                Action::DecodingFrame,
            );
        }
        if payload.len() != self.frame_len() {
            return err(
                decode_err(format!(
                    "payload is {} bytes, expected {} for {}x{} NV21",
                    payload.len(),
                    self.frame_len(),
                    self.width,
                    self.height
                )),
                Action::DecodingFrame,
            );
        }

        let rgb = self.nv21_to_rgb(payload);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&rgb)
            .during(Action::DecodingFrame)?;
        log::trace!("frame compressed to {} bytes of JPEG", jpeg.len());

        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .during(Action::DecodingFrame)?;
        Ok(decoded.to_rgb8())
    }

    /// NV21 to RGB using BT.601 coefficients:
    /// - R = Y + 1.402 * (V - 128)
    /// - G = Y - 0.344 * (U - 128) - 0.714 * (V - 128)
    /// - B = Y + 1.772 * (U - 128)
    fn nv21_to_rgb(&self, payload: &[u8]) -> RgbImage {
        let w = self.width as usize;
        let h = self.height as usize;
        let luma = &payload[..w * h];
        let chroma = &payload[w * h..];

        let mut rgb = Vec::with_capacity(w * h * 3);
        for row in 0..h {
            for col in 0..w {
                let y = luma[row * w + col] as f32;
                // The VU plane is subsampled 2x2; NV21 stores V before U.
                let uv = (row / 2) * w + (col / 2) * 2;
                let v = chroma[uv] as f32;
                let u = chroma[uv + 1] as f32;

                let r = (y + 1.402 * (v - 128.0)).clamp(0.0, 255.0) as u8;
                let g = (y - 0.344 * (u - 128.0) - 0.714 * (v - 128.0)).clamp(0.0, 255.0) as u8;
                let b = (y + 1.772 * (u - 128.0)).clamp(0.0, 255.0) as u8;
                rgb.extend_from_slice(&[r, g, b]);
            }
        }

        // unwrap: the buffer was sized to exactly width * height * 3 above
        RgbImage::from_raw(self.width, self.height, rgb).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A mid-gray NV21 frame: Y = 128 everywhere, neutral chroma.
    fn gray_frame(decoder: &FrameDecoder) -> Vec<u8> {
        vec![128; decoder.frame_len()]
    }

    #[test]
    fn frame_len_matches_nv21_layout() {
        assert_eq!(FrameDecoder::new(10, 8, 80).frame_len(), 120);
        assert_eq!(FrameDecoder::new(640, 480, 80).frame_len(), 460_800);
    }

    #[test]
    fn decodes_to_declared_dimensions() {
        let decoder = FrameDecoder::new(16, 12, DEFAULT_JPEG_QUALITY);
        let image = decoder.decode(&gray_frame(&decoder)).unwrap();
        assert_eq!(image.dimensions(), (16, 12));

        // Neutral chroma at Y=128 must come back out as gray, within JPEG loss.
        let px = image.get_pixel(8, 6);
        for &c in px.0.iter() {
            assert!((c as i32 - 128).abs() < 8, "channel {} too far from gray", c);
        }
    }

    #[test]
    fn length_mismatch_is_a_decode_failure() {
        let decoder = FrameDecoder::new(16, 12, DEFAULT_JPEG_QUALITY);
        let short = vec![0u8; decoder.frame_len() - 1];
        let e = decoder.decode(&short).unwrap_err();
        assert!(e.is_decode_failure());

        let long = vec![0u8; decoder.frame_len() + 10];
        assert!(decoder.decode(&long).unwrap_err().is_decode_failure());
    }

    #[test]
    fn odd_dimensions_are_a_decode_failure() {
        let decoder = FrameDecoder::new(15, 12, DEFAULT_JPEG_QUALITY);
        let e = decoder.decode(&[0u8; 270]).unwrap_err();
        assert!(e.is_decode_failure());
    }
}
