use std::io::{prelude::*, BufWriter};
use std::fs::File;
use std::path::Path;
use anyhow::Result;

use jif::GifFrame;

const MAGIC_NUMBER: &[u8] = b"P3";

/// Writes a frame as a plain PPM. Alpha is dropped, transparent pixels come out black.
pub fn write_ppm(path: &Path, frame: &GifFrame) -> Result<()> {
    let file = File::create(path)?;

    let mut writer = BufWriter::new(&file);

    writer.write_all(MAGIC_NUMBER)?;
    writer.write_all(b"\n")?;
    writer.write_all(format!("{} {}", frame.width, frame.height).as_bytes())?;
    writer.write_all(b" 255")?;
    writer.write_all(b"\n")?;

    if frame.width == 0 {
        return Ok(writer.flush()?);
    }

    for row in frame.pixels.chunks(frame.width.into()) {
        let line = row
            .iter()
            .map(|pixel| format!("{: >3} {: >3} {: >3}", pixel.r, pixel.g, pixel.b))
            .collect::<Vec<_>>()
            .join(" ");
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }

    writer.flush()?;
    Ok(())
}
