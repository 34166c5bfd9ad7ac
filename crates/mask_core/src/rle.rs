//! COCO run-length encoding: uncompressed counts and the compressed string form.

use crate::mask::InstanceMask;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RleError {
    #[error("rle string contains byte {0:#04x} outside the encoded range")]
    InvalidChar(u8),
    #[error("rle string ends mid-value")]
    Truncated,
    #[error("rle counts produce a negative run length")]
    NegativeRun,
    #[error("rle counts cover {covered} pixels but size is {expected}")]
    SizeMismatch { covered: usize, expected: usize },
}

/// Column-major run-length counts, starting with a run of zeros
/// (possibly of length 0), alternating zero/one runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub height: u32,
    pub width: u32,
    pub counts: Vec<u32>,
}

impl Rle {
    /// Encode a mask. Runs are taken in column-major (Fortran) order,
    /// matching the COCO mask convention.
    pub fn from_mask(mask: &InstanceMask) -> Self {
        let (w, h) = (mask.width(), mask.height());
        let mut counts = Vec::new();
        let mut current = false;
        let mut run = 0u32;
        for x in 0..w {
            for y in 0..h {
                let v = mask.get(x, y);
                if v == current {
                    run += 1;
                } else {
                    counts.push(run);
                    current = v;
                    run = 1;
                }
            }
        }
        counts.push(run);
        Self {
            height: h,
            width: w,
            counts,
        }
    }

    /// Decode into a binary mask. Errors if the counts do not cover
    /// exactly `height * width` pixels.
    pub fn to_mask(&self) -> Result<InstanceMask, RleError> {
        let expected = (self.height as usize) * (self.width as usize);
        let covered: usize = self.counts.iter().map(|&c| c as usize).sum();
        if covered != expected {
            return Err(RleError::SizeMismatch { covered, expected });
        }
        let mut mask = InstanceMask::new(self.width, self.height);
        let mut value = false;
        let mut idx = 0usize;
        for &count in &self.counts {
            for _ in 0..count {
                if value {
                    let x = (idx / self.height as usize) as u32;
                    let y = (idx % self.height as usize) as u32;
                    mask.set(x, y, true);
                }
                idx += 1;
            }
            value = !value;
        }
        Ok(mask)
    }

    /// Compressed string form: counts[i] (delta-coded against counts[i-2]
    /// for i > 2) emitted as little-endian 5-bit chunks with a continuation
    /// bit, each chunk offset into printable ASCII by 48.
    pub fn to_string_encoded(&self) -> String {
        let mut s = String::with_capacity(self.counts.len() * 2);
        for i in 0..self.counts.len() {
            let mut x = self.counts[i] as i64;
            if i > 2 {
                x -= self.counts[i - 2] as i64;
            }
            let mut more = true;
            while more {
                let mut c = (x & 0x1f) as u8;
                x >>= 5;
                more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
                if more {
                    c |= 0x20;
                }
                s.push((c + 48) as char);
            }
        }
        s
    }

    /// Decode the compressed string form.
    pub fn from_string_encoded(height: u32, width: u32, s: &str) -> Result<Self, RleError> {
        let bytes = s.as_bytes();
        let mut counts: Vec<u32> = Vec::new();
        let mut p = 0usize;
        while p < bytes.len() {
            let mut x: i64 = 0;
            let mut k = 0u32;
            loop {
                if p >= bytes.len() {
                    return Err(RleError::Truncated);
                }
                let b = bytes[p];
                if !(48..112).contains(&b) {
                    return Err(RleError::InvalidChar(b));
                }
                let c = (b - 48) as i64;
                x |= (c & 0x1f) << (5 * k);
                p += 1;
                k += 1;
                if c & 0x20 == 0 {
                    if c & 0x10 != 0 {
                        x |= -1i64 << (5 * k);
                    }
                    break;
                }
            }
            if counts.len() > 2 {
                x += counts[counts.len() - 2] as i64;
            }
            if x < 0 {
                return Err(RleError::NegativeRun);
            }
            counts.push(x as u32);
        }
        Ok(Self {
            height,
            width,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut mask = InstanceMask::new(7, 5);
        mask.fill_rect(1, 1, 4, 4);
        mask.set(6, 0, true);
        let rle = Rle::from_mask(&mask);
        assert_eq!(rle.to_mask().unwrap(), mask);

        let s = rle.to_string_encoded();
        let back = Rle::from_string_encoded(rle.height, rle.width, &s).unwrap();
        assert_eq!(back, rle);
    }

    #[test]
    fn known_string_vectors() {
        let rle = Rle {
            height: 1,
            width: 5,
            counts: vec![2, 3],
        };
        assert_eq!(rle.to_string_encoded(), "23");
        let back = Rle::from_string_encoded(1, 5, "23").unwrap();
        assert_eq!(back.counts, vec![2, 3]);

        // Multi-chunk values and the i>2 delta.
        let rle = Rle {
            height: 1,
            width: 105,
            counts: vec![50, 2, 50, 3],
        };
        assert_eq!(rle.to_string_encoded(), "b12b11");
        let back = Rle::from_string_encoded(1, 105, "b12b11").unwrap();
        assert_eq!(back.counts, vec![50, 2, 50, 3]);
    }

    #[test]
    fn empty_and_full_masks() {
        let empty = InstanceMask::new(4, 4);
        let rle = Rle::from_mask(&empty);
        assert_eq!(rle.counts, vec![16]);

        let mut full = InstanceMask::new(4, 4);
        full.fill_rect(0, 0, 4, 4);
        let rle = Rle::from_mask(&full);
        assert_eq!(rle.counts, vec![0, 16]);
        assert_eq!(rle.to_mask().unwrap(), full);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let rle = Rle {
            height: 4,
            width: 4,
            counts: vec![3],
        };
        assert!(matches!(
            rle.to_mask(),
            Err(RleError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn column_major_order() {
        // Single pixel at (x=1, y=0) in a 2x2 mask: column-major index 2.
        let mut mask = InstanceMask::new(2, 2);
        mask.set(1, 0, true);
        let rle = Rle::from_mask(&mask);
        assert_eq!(rle.counts, vec![2, 1, 1]);
    }
}
