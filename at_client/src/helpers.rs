/// Byte slice search used to classify response lines.
pub trait SliceExt {
    fn contains_slice(&self, needle: &[u8]) -> bool;
}

impl SliceExt for [u8] {
    fn contains_slice(&self, needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.windows(needle.len()).any(|window| window == needle)
    }
}

/// Formats a byte slice as a string when it is valid UTF-8, and as raw bytes
/// otherwise.
pub struct LossyStr<'a>(pub &'a [u8]);

impl core::fmt::Debug for LossyStr<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LossyStr<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        match core::str::from_utf8(self.0) {
            Ok(s) => defmt::write!(fmt, "{:?}", s),
            Err(_) => defmt::write!(fmt, "{:?}", self.0),
        }
    }
}
