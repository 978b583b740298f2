use super::bit_reader::BitReader;

use log::trace;
use thiserror::Error;

const MAX_CODE_SIZE: u32 = 12;
const MAX_TABLE_LENGTH: usize = 1 << MAX_CODE_SIZE;

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum LzwError {
    #[error("minimum code size {0} is outside of 2..=12")]
    InvalidMinimumCodeSize(u8),

    #[error("image data did not contain a single valid code")]
    NoValidCodes,
}

/// Decodes a GIF LZW data stream into at most `pixel_count` color table indexes.
///
/// Decoding stops at the end of information code, at the first code that can't be
/// resolved, or when the stream runs dry. A short result is not an error.
pub(crate) fn lzw_decode(buf: &[u8], minimum_code_size: u8, pixel_count: usize) -> Result<Vec<u8>, LzwError> {
    if !(2..=12).contains(&minimum_code_size) {
        return Err(LzwError::InvalidMinimumCodeSize(minimum_code_size));
    }

    let minimum_code_size = u32::from(minimum_code_size);
    let clear_code: u32 = 1 << minimum_code_size;
    let end_of_information_code = clear_code + 1;
    trace!("clear_code={clear_code} end_of_information_code={end_of_information_code}");

    let mut code_table = init_code_table(clear_code);
    let mut reader = BitReader::new(buf);
    let mut code_size = minimum_code_size + 1;
    let mut next_code = end_of_information_code + 1;

    // each code takes at least one bit, so the stream bounds the first reservation
    let mut indicies: Vec<u8> = Vec::with_capacity(pixel_count.min(buf.len() * 8));
    let mut last_code: Option<usize> = None;
    let mut read_valid_code = false;

    while indicies.len() < pixel_count {
        let Some(code) = reader.next(code_size) else {
            trace!("ran out of image data after {} indexes", indicies.len());
            break;
        };

        if code == end_of_information_code {
            break;
        }

        if code == clear_code {
            trace!("cleared");
            code_size = minimum_code_size + 1;
            next_code = end_of_information_code + 1;
            code_table.truncate(next_code as usize);
            last_code = None;
            continue;
        }

        let code = code as usize;
        let code_indicies = match code_table.get(code) {
            Some(known) if !known.is_empty() => known.clone(),
            _ => match last_code {
                // {CODE-1}+K where K is the first index of {CODE-1}, only while it can still be stored
                Some(last) if code == next_code as usize && code_table.len() < MAX_TABLE_LENGTH => {
                    let mut entry = code_table[last].clone();
                    entry.push(entry[0]);
                    entry
                }
                _ => {
                    trace!("invalid code {code}, next code is {next_code}");
                    break;
                }
            },
        };
        read_valid_code = true;

        indicies.extend_from_slice(&code_indicies);

        if let Some(last) = last_code {
            if code_table.len() < MAX_TABLE_LENGTH {
                let mut new_code_table_entry = code_table[last].clone();
                new_code_table_entry.push(code_indicies[0]);
                code_table.push(new_code_table_entry);

                next_code += 1;
                if next_code >= (1 << code_size) && code_size < MAX_CODE_SIZE {
                    code_size += 1;
                }
            }
        }

        last_code = Some(code);
    }

    if !read_valid_code && pixel_count > 0 {
        return Err(LzwError::NoValidCodes);
    }

    indicies.truncate(pixel_count);
    Ok(indicies)
}

fn init_code_table(clear_code: u32) -> Vec<Vec<u8>> {
    // single index roots, then empty slots standing in for the clear and end codes.
    // roots past 255 can't name a color and stay empty, which makes them invalid codes.
    (0..clear_code)
        .map(|i| u8::try_from(i).map(|i| vec![i]).unwrap_or_default())
        .chain([Vec::new(), Vec::new()])
        .collect()
}
