//! Content sniffing for uploaded images
//!
//! Classifies a byte buffer by its leading signature. This is a closed
//! allow-list, not an image parser: anything outside JPEG/PNG/GIF/WEBP is
//! rejected, and a valid signature followed by garbage still passes.

use std::fmt;

/// Shortest buffer that can be classified. Applies to every format,
/// including JPEG whose signature is only three bytes long.
pub const MIN_SIGNATURE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Detect the image format of `bytes`, or `None` if it is not a supported image.
pub fn sniff(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.len() < MIN_SIGNATURE_LEN {
        return None;
    }

    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(ImageFormat::Png),
        [0x47, 0x49, 0x46, 0x38, ..] => Some(ImageFormat::Gif),
        // "RIFF" container header
        [0x52, 0x49, 0x46, 0x46, ..] => Some(ImageFormat::Webp),
        _ => {
            tracing::debug!(
                "Rejected upload (first 4 bytes: {:02X?})",
                &bytes[..MIN_SIGNATURE_LEN]
            );
            None
        }
    }
}
