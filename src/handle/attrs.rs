//! Shared attribute-area payload
//!
//! Buffers allocated with the attribute-area wire version carry a second
//! small shared region holding extended metadata that does not fit the
//! fixed-layout handle words. The payload is a length-prefixed bincode
//! record so producers and consumers on different crate minor versions can
//! still exchange it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VermeerError};

use super::flags::YuvInfo;

/// Crop rectangle within a buffer, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Extended per-buffer metadata stored in the shared attribute area
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BufferAttributes {
    /// Colorimetry for YUV formats
    pub yuv_info: YuvInfo,
    /// Valid content region, if smaller than the full buffer
    pub crop: Option<CropRect>,
    /// Producer wrote new content since the last consumer read
    pub content_dirty: bool,
}

impl BufferAttributes {
    /// Write the length-prefixed record into a mapped attribute region
    pub fn write_to(&self, region: &mut [u8]) -> Result<()> {
        let payload = bincode::serialize(self)?;
        let total = 4 + payload.len();
        if total > region.len() {
            return Err(VermeerError::serialization(format!(
                "attribute payload of {} bytes exceeds region of {} bytes",
                total,
                region.len()
            )));
        }
        region[..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        region[4..total].copy_from_slice(&payload);
        Ok(())
    }

    /// Read the length-prefixed record back from a mapped attribute region
    pub fn read_from(region: &[u8]) -> Result<Self> {
        if region.len() < 4 {
            return Err(VermeerError::serialization(
                "attribute region too small for length prefix",
            ));
        }
        let len = u32::from_le_bytes([region[0], region[1], region[2], region[3]]) as usize;
        if 4 + len > region.len() {
            return Err(VermeerError::serialization(format!(
                "attribute payload length {} exceeds region of {} bytes",
                len,
                region.len()
            )));
        }
        Ok(bincode::deserialize(&region[4..4 + len])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_round_trip() {
        let attrs = BufferAttributes {
            yuv_info: YuvInfo::Bt709Narrow,
            crop: Some(CropRect {
                left: 0,
                top: 0,
                right: 1920,
                bottom: 1080,
            }),
            content_dirty: true,
        };

        let mut region = vec![0u8; 4096];
        attrs.write_to(&mut region).unwrap();
        let decoded = BufferAttributes::read_from(&region).unwrap();
        assert_eq!(decoded, attrs);
    }

    #[test]
    fn test_attributes_region_too_small() {
        let attrs = BufferAttributes::default();
        let mut region = vec![0u8; 2];
        assert!(attrs.write_to(&mut region).is_err());
        assert!(BufferAttributes::read_from(&region).is_err());
    }

    #[test]
    fn test_attributes_corrupt_length_prefix() {
        let mut region = vec![0u8; 64];
        BufferAttributes::default().write_to(&mut region).unwrap();
        // Claim a payload longer than the region
        region[..4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(BufferAttributes::read_from(&region).is_err());
    }
}
