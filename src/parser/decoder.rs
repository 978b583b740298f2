#![allow(dead_code)]

use super::lzw::{self, LzwError};
use super::DisposalMethod;
use crate::frame::{GifFrame, Rgba};

use thiserror::Error;
use log::{debug, trace, warn};

use std::io::{self, prelude::*, Cursor};

const EXTENSION_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR_LABEL: u8 = 0x2c;
const TRAILER_LABEL: u8 = 0x3b;

// Extension labels
const APPLICATION_EXTENSION: u8 = 0xff;
const COMMENT_EXTENSION: u8 = 0xfe;
const GRAPHIC_CONTROL_EXTENSION: u8 = 0xf9;
const PLAIN_TEXT_EXTENSION: u8 = 0x01;

// (starting row, row step) for each of the four interlace passes
const INTERLACE_PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

#[derive(Debug)]
enum ExtensionType {
    Application,
    Comment,
    GraphicControl,
    PlainText,
    Unknown(u8),
}

impl From<u8> for ExtensionType {
    fn from(value: u8) -> Self {
        use ExtensionType::*;

        match value {
            APPLICATION_EXTENSION => Application,
            COMMENT_EXTENSION => Comment,
            GRAPHIC_CONTROL_EXTENSION => GraphicControl,
            PLAIN_TEXT_EXTENSION => PlainText,
            label => Unknown(label),
        }
    }
}

/// Values carried from a graphic control extension to the next image descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct GraphicControlExtension {
    disposal_method: DisposalMethod,
    transparent_color_index: Option<u8>,
    delay_time: u16,
}

#[derive(Debug)]
pub(crate) struct ImageDescriptor {
    pub(crate) left_position: u16,
    pub(crate) top_position: u16,

    pub(crate) width: u16,
    pub(crate) height: u16,

    pub(crate) local_color_table_flag: bool,
    pub(crate) interlace_flag: bool,
    pub(crate) sort_flag: bool,
    // number of entries, not bytes
    pub(crate) local_color_table_size: Option<usize>,
}

#[derive(Debug)]
pub(crate) enum Version {
    V87a,
    V89a
}

impl TryFrom<&[u8]> for Version {
    type Error = ParserError;

    fn try_from(value: &[u8]) -> std::result::Result<Self, Self::Error> {
        match value {
            b"87a" => Ok(Version::V87a),
            b"89a" => Ok(Version::V89a),
            version => Err(ParserError::UnsupportedVersion(String::from_utf8_lossy(version).into()))
        }
    }
}

#[derive(Debug)]
pub(crate) struct LogicalScreenDescriptor {
    pub(crate) screen_width: u16,
    pub(crate) screen_height: u16,
    pub(crate) global_color_table_flag: bool,
    pub(crate) color_resolution: u8,
    pub(crate) sort_flag: bool,
    // number of entries, not bytes
    pub(crate) global_color_table_size: Option<usize>,
    pub(crate) background_color_index: u8,
    pub(crate) pixel_aspect_ratio: u8,
}

#[derive(Debug)]
pub(crate) enum ParserState {
    ProcessMagic,
    ProcessLogicalScreenDescriptor,
    ProcessGlobalColorTable,
    ProcessTrailer,

    DetermineNextBlock,
    ProcessExtension(u8),
    ProcessImageDescriptor,

    Done,
}

#[derive(Error, Debug)]
pub(crate) enum ParserError {
    #[error("signature is invalid")]
    InvalidSignature,

    #[error("version {0} in the header is unsupported")]
    UnsupportedVersion(String),

    #[error("data ended early: {0}")]
    Truncated(#[from] io::Error),

    #[error("image has neither a local nor a global color table")]
    MissingColorTable,

    #[error("image data could not be decompressed: {0}")]
    Lzw(#[from] LzwError),
}

type Result<T> = std::result::Result<T, ParserError>;

/// A single decoding session over a complete GIF buffer.
///
/// Decoding never fails: a broken header yields no frames, a broken image skips
/// that one frame, and anything after an unrecognized block is ignored.
#[derive(Debug)]
pub struct Decoder<'a> {
    inner: Cursor<&'a [u8]>,
    pub(crate) version: Option<Version>,
    pub(crate) logical_screen_descriptor: Option<LogicalScreenDescriptor>,
    pub(crate) global_color_table: Option<Box<[Rgba]>>,

    canvas: Vec<Rgba>,
    previous_canvas: Vec<Rgba>,
    // applies to the next image descriptor only
    graphic_control_extension: GraphicControlExtension,
    // declared by the previous image, applied before drawing the next one
    last_disposal_method: DisposalMethod,

    frames: Vec<GifFrame>,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(buf),
            version: None,
            logical_screen_descriptor: None,
            global_color_table: None,
            canvas: Vec::new(),
            previous_canvas: Vec::new(),
            graphic_control_extension: GraphicControlExtension::default(),
            last_disposal_method: DisposalMethod::default(),
            frames: Vec::new(),
        }
    }

    /// Runs the decoder to completion and returns every frame it could recover.
    pub fn decode(mut self) -> Vec<GifFrame> {
        if let Err(err) = self.parse() {
            warn!("stopped decoding after {} frame(s): {err}", self.frames.len());
        }
        self.frames
    }

    fn parse(&mut self) -> Result<()> {
        let mut state = ParserState::ProcessMagic;

        loop {
            trace!("begin parsing state {:?}", state);

            state = self.process_next_state(state)?;
            if let ParserState::Done = state {
                break Ok(());
            }
        }
    }

    fn process_next_state(&mut self, next_state: ParserState) -> Result<ParserState> {
        use ParserState::*;

        match next_state {
            ProcessMagic => {
                let signature = self.read_bytes(3)?;
                if &*signature != b"GIF" {
                    return Err(ParserError::InvalidSignature)
                }

                self.version = Some(Version::try_from(&*self.read_bytes(3)?)?);
                debug!("processed header, got {:?}", self.version);

                Ok(ProcessLogicalScreenDescriptor)
            },
            ProcessLogicalScreenDescriptor => {
                let screen_width = self.read_u16()?;
                let screen_height = self.read_u16()?;

                let packed_fields = self.read_byte()?;

                // packed field start
                let global_color_table_flag = packed_fields & 0b10000000 != 0;
                let color_resolution = (packed_fields >> 4) & 0b00000111;
                let sort_flag = packed_fields & 0b00001000 != 0;
                let global_color_table_size = global_color_table_flag
                    .then(|| color_table_size(packed_fields));
                // packed field end

                let background_color_index = self.read_byte()?;
                let pixel_aspect_ratio = self.read_byte()?;

                let pixel_count = usize::from(screen_width) * usize::from(screen_height);
                self.canvas = vec![Rgba::TRANSPARENT; pixel_count];
                self.previous_canvas = vec![Rgba::TRANSPARENT; pixel_count];

                self.logical_screen_descriptor = Some(LogicalScreenDescriptor {
                    screen_width,
                    screen_height,
                    global_color_table_flag,
                    color_resolution,
                    sort_flag,
                    global_color_table_size,
                    background_color_index,
                    pixel_aspect_ratio,
                });

                debug!("processed logical screen descriptor, got: {:?}", self.logical_screen_descriptor);

                let next_state = if global_color_table_flag {
                    ProcessGlobalColorTable
                } else {
                    DetermineNextBlock
                };

                Ok(next_state)
            },
            ProcessGlobalColorTable => {
                let size = self
                    .logical_screen_descriptor
                    .as_ref()
                    .and_then(|screen_desc| screen_desc.global_color_table_size)
                    .unwrap_or_default();

                self.global_color_table = Some(self.read_color_table(size)?);
                debug!("processed global color table with {size} entries");

                Ok(DetermineNextBlock)
            },
            ProcessTrailer => {
                Ok(Done)
            }
            DetermineNextBlock => {
                let Ok(introducer_or_label) = self.read_byte() else {
                    debug!("reached end of data without a trailer");
                    return Ok(Done);
                };

                match introducer_or_label {
                    // extension introducer means that a label follows determining what exact type
                    // of extension it is.
                    EXTENSION_INTRODUCER => Ok(ProcessExtension(self.read_byte()?)),
                    IMAGE_DESCRIPTOR_LABEL => Ok(ProcessImageDescriptor),
                    TRAILER_LABEL => Ok(ProcessTrailer),
                    label => {
                        debug!("treating unexpected label 0x{label:02x} as a trailer");
                        Ok(ProcessTrailer)
                    }
                }
            },
            ProcessExtension(label) => self.process_extension(ExtensionType::from(label)),
            ProcessImageDescriptor => {
                let descriptor = self.read_image_descriptor()?;

                let local_color_table = match descriptor.local_color_table_size {
                    Some(size) => Some(self.read_color_table(size)?),
                    None => None,
                };

                let lzw_code_size = self.read_byte()?;
                let data_stream = self.read_data_sub_blocks()?;

                let graphic_control_extension = std::mem::take(&mut self.graphic_control_extension);

                match self.render_frame(
                    &descriptor,
                    local_color_table.as_deref(),
                    graphic_control_extension,
                    lzw_code_size,
                    &data_stream,
                ) {
                    Ok(frame) => self.frames.push(frame),
                    Err(err) => warn!("skipping image {}: {err}", self.frames.len()),
                }

                self.last_disposal_method = graphic_control_extension.disposal_method;

                Ok(DetermineNextBlock)
            },
            Done => Ok(Done),
        }
    }

    fn process_extension(&mut self, label: ExtensionType) -> Result<ParserState> {
        use ExtensionType::*;

        debug!("processing extension type: {:?}", label);
        match label {
            GraphicControl => {
                // always 4, the fields below are read at fixed positions regardless
                let block_size = self.read_byte()?;
                trace!("graphic control extension block size {block_size}");

                let packed_fields = self.read_byte()?;
                // packed fields definition
                // XXXYYYZW
                // XXX = reserved, not needed
                // YYY = disposal method, indicates what to do with graphic after displaying
                // Z = user input flag
                // W = transparent color flag

                let disposal_method = (packed_fields >> 2) & 0b00000111;
                let transparent_color_flag = packed_fields & 0b00000001 != 0;

                let delay_time = self.read_u16()?;
                // the index byte is present whether or not the flag is set
                let transparent_color_index = self.read_byte()?;

                let block_terminator = self.read_byte()?;
                if block_terminator != 0 {
                    warn!("graphic control extension terminator was 0x{block_terminator:02x}");
                }

                self.graphic_control_extension = GraphicControlExtension {
                    disposal_method: DisposalMethod::from_u8(disposal_method).unwrap_or_default(),
                    transparent_color_index: transparent_color_flag.then_some(transparent_color_index),
                    delay_time,
                };

                debug!("processed GraphicControlExtension: {:?}", self.graphic_control_extension);
            },
            Application => {
                let data = self.read_data_sub_blocks()?;
                let identifier = data.get(..8).unwrap_or(&data[..]);
                debug!("skipped application extension {}", String::from_utf8_lossy(identifier));
            },
            Comment => {
                let data = self.read_data_sub_blocks()?;
                debug!("skipped comment block: {}", String::from_utf8_lossy(&data));
            },
            PlainText | Unknown(_) => {
                self.read_data_sub_blocks()?;
            },
        }

        Ok(ParserState::DetermineNextBlock)
    }

    fn read_image_descriptor(&mut self) -> Result<ImageDescriptor> {
        let left_position = self.read_u16()?;
        let top_position = self.read_u16()?;

        let width = self.read_u16()?;
        let height = self.read_u16()?;

        let packed_fields = self.read_byte()?;

        let local_color_table_flag = packed_fields & 0b10000000 != 0;
        let interlace_flag = packed_fields & 0b01000000 != 0;
        let sort_flag = packed_fields & 0b00100000 != 0;
        let local_color_table_size = local_color_table_flag
            .then(|| color_table_size(packed_fields));

        let descriptor = ImageDescriptor {
            left_position,
            top_position,
            width,
            height,
            local_color_table_flag,
            interlace_flag,
            sort_flag,
            local_color_table_size,
        };
        debug!("processed image descriptor: {:?}", descriptor);

        Ok(descriptor)
    }

    fn render_frame(
        &mut self,
        descriptor: &ImageDescriptor,
        local_color_table: Option<&[Rgba]>,
        graphic_control_extension: GraphicControlExtension,
        lzw_code_size: u8,
        data_stream: &[u8],
    ) -> Result<GifFrame> {
        let Some(screen_desc) = self.logical_screen_descriptor.as_ref() else {
            return Err(ParserError::MissingColorTable);
        };
        let screen_width = screen_desc.screen_width;
        let screen_height = screen_desc.screen_height;

        let color_table = local_color_table
            .or(self.global_color_table.as_deref())
            .ok_or(ParserError::MissingColorTable)?;

        dispose(self.last_disposal_method, &mut self.canvas, &mut self.previous_canvas);

        let pixel_count = usize::from(descriptor.width) * usize::from(descriptor.height);
        let indicies = lzw::lzw_decode(data_stream, lzw_code_size, pixel_count)?;
        if indicies.len() < pixel_count {
            debug!("image data only covered {} of {pixel_count} pixels", indicies.len());
        }

        draw(
            &mut self.canvas,
            usize::from(screen_width),
            usize::from(screen_height),
            descriptor,
            color_table,
            graphic_control_extension.transparent_color_index,
            &indicies,
        );

        Ok(GifFrame {
            pixels: self.canvas.clone(),
            width: screen_width,
            height: screen_height,
            delay: graphic_control_extension.delay_time,
        })
    }

    fn read_color_table(&mut self, entries: usize) -> Result<Box<[Rgba]>> {
        let bytes = self.read_bytes(entries * 3)?;
        Ok(bytes
            .chunks_exact(3)
            .map(|rgb| Rgba::opaque(rgb[0], rgb[1], rgb[2]))
            .collect())
    }

    fn read_bytes(&mut self, count: usize) -> Result<Box<[u8]>> {
        let mut buffer = vec![0; count];
        self.inner.read_exact(&mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer: [u8; 1] = [0; 1];
        self.inner.read_exact(&mut buffer)?;
        Ok(u8::from_le_bytes(buffer))
    }

    fn read_u16(&mut self) -> Result<u16> {
        // GIF89a: Unless otherwise stated, multi-byte numeric fields are ordered with the Least
        // Significant Byte first.

        let mut buffer: [u8; 2] = [0; 2];
        self.inner.read_exact(&mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a chain of data sub-blocks. A chain cut short by the end of the buffer
    /// yields whatever bytes were present.
    fn read_data_sub_blocks(&mut self) -> Result<Vec<u8>> {
        let mut result = Vec::new();

        loop {
            let Ok(block_size) = self.read_byte() else {
                warn!("data sub-blocks ended without a block terminator");
                break;
            };

            if block_size == 0 {
                break;
            }

            let mut sub_block_buffer = vec![0; block_size.into()];
            let read = self.inner.read(&mut sub_block_buffer)?;
            result.extend_from_slice(&sub_block_buffer[..read]);

            if read < sub_block_buffer.len() {
                warn!("data sub-block truncated to {read} of {block_size} bytes");
                break;
            }
        }

        Ok(result)
    }
}

/// Number of entries in a color table described by the low 3 bits of a packed field.
fn color_table_size(packed_fields: u8) -> usize {
    1usize << ((packed_fields & 0b00000111) + 1)
}

fn dispose(method: DisposalMethod, canvas: &mut [Rgba], previous_canvas: &mut [Rgba]) {
    use DisposalMethod::*;

    match method {
        Unspecified | DoNotDispose => previous_canvas.copy_from_slice(canvas),
        RestoreToBackgroundColor => canvas.fill(Rgba::TRANSPARENT),
        RestoreToPrevious => canvas.copy_from_slice(previous_canvas),
    }
}

/// Order in which the rows of an interlaced image appear in its data stream.
fn interlaced_rows(height: usize) -> Vec<usize> {
    INTERLACE_PASSES
        .iter()
        .flat_map(|&(start, step)| (start..height).step_by(step))
        .collect()
}

fn draw(
    canvas: &mut [Rgba],
    screen_width: usize,
    screen_height: usize,
    descriptor: &ImageDescriptor,
    color_table: &[Rgba],
    transparent_color_index: Option<u8>,
    indicies: &[u8],
) {
    let width = usize::from(descriptor.width);
    let height = usize::from(descriptor.height);
    if width == 0 {
        return;
    }

    let rows: Vec<usize> = if descriptor.interlace_flag {
        interlaced_rows(height)
    } else {
        (0..height).collect()
    };

    let left = usize::from(descriptor.left_position);
    let top = usize::from(descriptor.top_position);

    for (row_indicies, &row) in indicies.chunks(width).zip(rows.iter()) {
        let y = top + row;
        if y >= screen_height {
            continue;
        }

        for (column, &index) in row_indicies.iter().enumerate() {
            let x = left + column;
            if x >= screen_width {
                break;
            }

            if transparent_color_index == Some(index) {
                continue;
            }

            // indexes past the end of the table leave the canvas alone
            if let Some(&color) = color_table.get(usize::from(index)) {
                canvas[y * screen_width + x] = color;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba = Rgba::opaque(255, 0, 0);
    const BLUE: Rgba = Rgba::opaque(0, 0, 255);

    fn descriptor(left: u16, top: u16, width: u16, height: u16, interlace_flag: bool) -> ImageDescriptor {
        ImageDescriptor {
            left_position: left,
            top_position: top,
            width,
            height,
            local_color_table_flag: false,
            interlace_flag,
            sort_flag: false,
            local_color_table_size: None,
        }
    }

    #[test]
    fn interlace_row_order() {
        assert_eq!(interlaced_rows(10), vec![0, 8, 4, 2, 6, 1, 3, 5, 7, 9]);
        assert_eq!(interlaced_rows(4), vec![0, 2, 1, 3]);
        assert_eq!(interlaced_rows(1), vec![0]);
    }

    #[test]
    fn disposal_methods() {
        let mut canvas = vec![RED; 4];
        let mut previous = vec![BLUE; 4];

        dispose(DisposalMethod::DoNotDispose, &mut canvas, &mut previous);
        assert_eq!(previous, vec![RED; 4]);
        assert_eq!(canvas, vec![RED; 4]);

        previous = vec![BLUE; 4];
        dispose(DisposalMethod::Unspecified, &mut canvas, &mut previous);
        assert_eq!(previous, vec![RED; 4]);

        previous = vec![BLUE; 4];
        dispose(DisposalMethod::RestoreToPrevious, &mut canvas, &mut previous);
        assert_eq!(canvas, vec![BLUE; 4]);

        dispose(DisposalMethod::RestoreToBackgroundColor, &mut canvas, &mut previous);
        assert_eq!(canvas, vec![Rgba::TRANSPARENT; 4]);
        assert_eq!(previous, vec![BLUE; 4]);
    }

    #[test]
    fn draw_clips_to_the_screen() {
        let mut canvas = vec![Rgba::TRANSPARENT; 4];
        // 2x2 image placed at (1, 1) on a 2x2 screen, only its top left pixel lands
        draw(&mut canvas, 2, 2, &descriptor(1, 1, 2, 2, false), &[RED, BLUE], None, &[1, 0, 0, 0]);
        assert_eq!(canvas, vec![Rgba::TRANSPARENT, Rgba::TRANSPARENT, Rgba::TRANSPARENT, BLUE]);
    }

    #[test]
    fn draw_skips_transparent_and_out_of_table_indexes() {
        let mut canvas = vec![BLUE; 3];
        draw(&mut canvas, 3, 1, &descriptor(0, 0, 3, 1, false), &[RED], Some(1), &[0, 1, 7]);
        assert_eq!(canvas, vec![RED, BLUE, BLUE]);
    }

    #[test]
    fn draw_tolerates_short_index_streams() {
        let mut canvas = vec![Rgba::TRANSPARENT; 4];
        draw(&mut canvas, 2, 2, &descriptor(0, 0, 2, 2, false), &[RED], None, &[0]);
        assert_eq!(canvas, vec![RED, Rgba::TRANSPARENT, Rgba::TRANSPARENT, Rgba::TRANSPARENT]);
    }

    #[test]
    fn graphic_control_extension_keeps_alignment_without_transparency() {
        // disposal 2, no transparency flag, delay 10, index byte 0x07, terminator, trailer
        let buf = [0x04, 0b0000_1000, 0x0a, 0x00, 0x07, 0x00, TRAILER_LABEL];
        let mut decoder = Decoder::new(&buf);

        let next = decoder.process_extension(ExtensionType::GraphicControl).unwrap();
        assert!(matches!(next, ParserState::DetermineNextBlock));
        assert_eq!(
            decoder.graphic_control_extension,
            GraphicControlExtension {
                disposal_method: DisposalMethod::RestoreToBackgroundColor,
                transparent_color_index: None,
                delay_time: 10,
            }
        );
        assert_eq!(decoder.read_byte().unwrap(), TRAILER_LABEL);
    }

    #[test]
    fn graphic_control_extension_with_transparency() {
        let buf = [0x04, 0b0000_1101, 0x00, 0x01, 0x03, 0x00];
        let mut decoder = Decoder::new(&buf);

        decoder.process_extension(ExtensionType::GraphicControl).unwrap();
        assert_eq!(
            decoder.graphic_control_extension,
            GraphicControlExtension {
                disposal_method: DisposalMethod::RestoreToPrevious,
                transparent_color_index: Some(3),
                delay_time: 256,
            }
        );
    }

    #[test]
    fn skips_unknown_extension_sub_blocks() {
        let buf = [0x02, 0xaa, 0xbb, 0x01, 0xcc, 0x00, TRAILER_LABEL];
        let mut decoder = Decoder::new(&buf);

        decoder.process_extension(ExtensionType::from(0x42)).unwrap();
        assert_eq!(decoder.read_byte().unwrap(), TRAILER_LABEL);
    }

    #[test]
    fn truncated_sub_blocks_keep_what_was_read() {
        let buf = [0x04, 0x01, 0x02];
        let mut decoder = Decoder::new(&buf);
        assert_eq!(decoder.read_data_sub_blocks().unwrap(), vec![0x01, 0x02]);
    }
}
