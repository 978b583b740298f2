//! A lenient GIF87a/GIF89a decoder producing fully composited RGBA frames.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod frame;
mod parser;

pub use frame::{GifFrame, Rgba};
pub use parser::Decoder;

/// Decodes every frame of a GIF held in memory.
///
/// Malformed input never errors: it produces fewer frames, or none at all.
pub fn decode(bytes: &[u8]) -> Vec<GifFrame> {
    Decoder::new(bytes).decode()
}

/// Reads a GIF file fully and decodes it. Only I/O failures are reported.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<Vec<GifFrame>> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(decode(&bytes))
}
