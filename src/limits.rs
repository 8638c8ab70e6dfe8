//! Configurable decode limits.
//!
//! Guards against malformed or hostile frame headers requesting
//! excessive allocations. All limits are optional; `None` means
//! unlimited.

use crate::api::DecodingError;

/// Resource limits applied before plane allocation.
///
/// ```rust
/// use vp8frame::Limits;
///
/// let limits = Limits::default()
///     .max_dimensions(4096, 4096)
///     .max_memory(256 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Limits {
    /// Maximum frame width in pixels.
    pub max_width: Option<u32>,

    /// Maximum frame height in pixels.
    pub max_height: Option<u32>,

    /// Maximum total pixels, bounding memory for odd aspect ratios.
    pub max_total_pixels: Option<u64>,

    /// Maximum plane memory in bytes.
    pub max_memory: Option<u64>,
}

impl Default for Limits {
    /// Defaults sized for untrusted input: the VP8 format maximum of
    /// 16384 x 16384, 100 megapixels, 1 GB of plane memory.
    fn default() -> Self {
        Self {
            max_width: Some(16384),
            max_height: Some(16384),
            max_total_pixels: Some(100_000_000),
            max_memory: Some(1024 * 1024 * 1024),
        }
    }
}

impl Limits {
    /// No restrictions. Only for trusted inputs.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_total_pixels: None,
            max_memory: None,
        }
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set the total pixel bound.
    #[must_use]
    pub fn max_total_pixels(mut self, pixels: u64) -> Self {
        self.max_total_pixels = Some(pixels);
        self
    }

    /// Set the plane memory bound in bytes.
    #[must_use]
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DecodingError> {
        if let Some(max_w) = self.max_width {
            if width > max_w {
                return Err(DecodingError::InvalidParameter(alloc::format!(
                    "width {width} exceeds limit {max_w}"
                )));
            }
        }

        if let Some(max_h) = self.max_height {
            if height > max_h {
                return Err(DecodingError::InvalidParameter(alloc::format!(
                    "height {height} exceeds limit {max_h}"
                )));
            }
        }

        if let Some(max_pixels) = self.max_total_pixels {
            let total = u64::from(width) * u64::from(height);
            if total > max_pixels {
                return Err(DecodingError::InvalidParameter(alloc::format!(
                    "total pixels {total} exceeds limit {max_pixels}"
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn check_memory(&self, bytes: usize) -> Result<(), DecodingError> {
        if let Some(max) = self.max_memory {
            if bytes as u64 > max {
                return Err(DecodingError::MemoryLimitExceeded);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_at_limit_pass() {
        let limits = Limits::default().max_dimensions(1000, 1000);
        assert!(limits.check_dimensions(1000, 1000).is_ok());
        assert!(limits.check_dimensions(1001, 500).is_err());
    }

    #[test]
    fn total_pixels_bound() {
        let limits = Limits::default().max_total_pixels(1_000_000);
        assert!(limits.check_dimensions(1000, 1000).is_ok());
        assert!(limits.check_dimensions(1001, 1000).is_err());
    }

    #[test]
    fn unlimited_accepts_everything() {
        let limits = Limits::none();
        assert!(limits.check_dimensions(u32::MAX, u32::MAX).is_ok());
        assert!(limits.check_memory(usize::MAX).is_ok());
    }

    #[test]
    fn memory_bound() {
        let limits = Limits::default().max_memory(1024);
        assert!(limits.check_memory(1024).is_ok());
        assert!(limits.check_memory(1025).is_err());
    }
}
