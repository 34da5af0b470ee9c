use std::path::Path;

use crate::error::AppError;

/// Flash contents as named byte ranges at absolute addresses. Gaps are
/// filled with 0xFF, the erased state of NOR flash.
#[derive(Debug, Clone, Default)]
pub struct FlashImage {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct Segment {
    name: String,
    addr: u32,
    bytes: Vec<u8>,
}

impl Segment {
    /// Exclusive end address.
    fn end(&self) -> u64 {
        u64::from(self.addr) + self.bytes.len() as u64
    }
}

impl FlashImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `bytes` at `addr`, refusing to overlap an earlier segment.
    pub fn put(&mut self, name: &str, addr: u32, bytes: Vec<u8>) -> Result<(), AppError> {
        let segment = Segment {
            name: name.to_string(),
            addr,
            bytes,
        };
        if segment.end() > u64::from(u32::MAX) + 1 {
            return Err(AppError::ImageTooLarge {
                name: segment.name,
            });
        }
        let start = u64::from(addr);
        if let Some(other) = self
            .segments
            .iter()
            .find(|s| start < s.end() && u64::from(s.addr) < segment.end())
        {
            return Err(AppError::ImageOverlap {
                name: segment.name,
                addr,
                other: other.name.clone(),
            });
        }
        tracing::debug!(segment = name, addr, len = segment.bytes.len(), "placed");
        self.segments.push(segment);
        Ok(())
    }

    /// The flat image from address 0 to the end of the highest segment.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.segments.iter().map(Segment::end).max().unwrap_or(0);
        let mut out = vec![0xFF; usize::try_from(len).unwrap_or(usize::MAX)];
        for segment in &self.segments {
            let start = segment.addr as usize;
            if let Some(dest) = out.get_mut(start..start + segment.bytes.len()) {
                dest.copy_from_slice(&segment.bytes);
            }
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        std::fs::write(path, self.to_bytes()).map_err(|e| AppError::io(path, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn gaps_are_erased_flash() {
        let mut image = FlashImage::new();
        image.put("states", 4, vec![1, 2]).unwrap();
        image.put("actions", 0, vec![9]).unwrap();
        assert_eq!(image.to_bytes(), vec![9, 0xFF, 0xFF, 0xFF, 1, 2]);
    }

    #[test]
    fn overlapping_segments_are_rejected() {
        let mut image = FlashImage::new();
        image.put("text", 0x10, vec![0; 0x10]).unwrap();
        let err = image.put("actions", 0x1F, vec![0; 2]).unwrap_err();
        assert!(matches!(err, AppError::ImageOverlap { ref other, .. } if other == "text"));
        // Touching is fine.
        image.put("states", 0x20, vec![0; 2]).unwrap();
    }

    #[test]
    fn segment_past_four_gib_is_rejected() {
        let mut image = FlashImage::new();
        let err = image.put("text", u32::MAX, vec![0; 2]).unwrap_err();
        assert!(matches!(err, AppError::ImageTooLarge { .. }));
    }

    #[test]
    fn writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.bin");
        let mut image = FlashImage::new();
        image.put("text", 2, b"HI".to_vec()).unwrap();
        image.write(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xFF, b'H', b'I']);
    }
}
