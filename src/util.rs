use std::io::{self, Read};

use byteorder::{ReadBytesExt, LE};
use uuid::Uuid;

/// Splits the class-specific descriptor blob trailing an interface descriptor into
/// `(descriptor_type, raw_bytes)` pairs.
pub(crate) fn split_descriptors(mut raw: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    std::iter::from_fn(move || match raw {
        [length, descriptor_type, ..] => {
            let length = *length as usize;
            if length > raw.len() {
                log::warn!(
                    "descriptor length {} exceeds available data ({} bytes)",
                    length,
                    raw.len()
                );
                return None;
            }
            let (desc_data, next) = raw.split_at(length);

            raw = next;

            Some((*descriptor_type, desc_data))
        }
        [] => None,
        _ => {
            log::warn!("invalid trailing descriptor bytes: {:x?}", raw);
            None
        }
    })
}

pub(crate) trait BytesExt {
    fn read_guid(&mut self) -> io::Result<Uuid>;
}

impl BytesExt for &'_ [u8] {
    fn read_guid(&mut self) -> io::Result<Uuid> {
        // Weird encoding, apparently the first 3 groups in a UUID are "numbers", the last 2 groups
        // are just "bytes", and USB-IF insists on encoding all numbers in little endian.
        let d1 = self.read_u32::<LE>()?;
        let d2 = self.read_u16::<LE>()?;
        let d3 = self.read_u16::<LE>()?;
        let mut d4 = [0; 8];
        self.read_exact(&mut d4)?;
        Ok(Uuid::from_fields(d1, d2, d3, &d4).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_descriptors_walks_length_prefixed_blob() {
        let raw = [3, 0x24, 0xaa, 2, 0x05, 4, 0x24, 0xbb, 0xcc];
        let descs: Vec<_> = split_descriptors(&raw).collect();
        assert_eq!(
            descs,
            vec![
                (0x24, &raw[0..3]),
                (0x05, &raw[3..5]),
                (0x24, &raw[5..9]),
            ]
        );
    }

    #[test]
    fn split_descriptors_stops_on_truncated_descriptor() {
        let raw = [3, 0x24, 0xaa, 9, 0x05];
        let descs: Vec<_> = split_descriptors(&raw).collect();
        assert_eq!(descs.len(), 1);
    }
}
