use std::env;
use std::fs;
use std::path::PathBuf;
use anyhow::{bail, Result};
use log::info;

mod ppm_writer;

fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args_os().skip(1);
    let Some(input) = args.next().map(PathBuf::from) else {
        bail!("usage: jif <input.gif> [output-dir]");
    };
    let output_dir = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("frames"));

    let frames = jif::decode_file(&input)?;
    info!("decoded {} frame(s) from {}", frames.len(), input.display());

    fs::create_dir_all(&output_dir)?;
    for (i, frame) in frames.iter().enumerate() {
        let path = output_dir.join(format!("frame_{i}.ppm"));
        ppm_writer::write_ppm(&path, frame)?;
        println!("{} {}x{} delay={}cs", path.display(), frame.width, frame.height, frame.delay);
    }

    Ok(())
}
