use crate::prelude::*;
use std::ops::Range;

// Chunk Identifiers
pub const RIFF_CHUNK_ID: &[u8; 4] = b"RIFF";
pub const WAVE_FORMAT_ID: &[u8; 4] = b"WAVE";
pub const FMT_CHUNK_ID: &[u8; 4] = b"fmt ";
pub const DATA_CHUNK_ID: &[u8; 4] = b"data";
pub const GUANO_CHUNK_ID: &[u8; 4] = b"guan";

// Chunk Structures
const STANDARD_FMT_CHUNK_SIZE: u32 = 16;
const HEADER_SIZE: usize = 12; // RIFF + size + WAVE
const CHUNK_HEADER_SIZE: usize = 8; // id + size

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
    pub frame_count: u64,
}

impl StreamInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }
}

pub fn validate_file_format(data: &[u8]) -> R<()> {
    if data.len() < HEADER_SIZE {
        return Err(anyhow!("File too small to be a valid WAV"));
    }

    // Check for 'RIFF....WAVE' header
    if &data[0..4] != RIFF_CHUNK_ID || &data[8..12] != WAVE_FORMAT_ID {
        return Err(anyhow!("Invalid WAV File: Missing RIFF/WAVE signature"));
    }

    Ok(())
}

pub fn read_stream_info(input: &[u8]) -> R<StreamInfo> {
    validate_file_format(input)?;

    let mut cursor = Cursor::new(input);
    cursor.seek(SeekFrom::Start(HEADER_SIZE as u64))?;

    let mut fmt: Option<(u16, u32, u16, u16)> = None;
    let mut data_size: Option<u64> = None;

    while cursor.position() + CHUNK_HEADER_SIZE as u64 <= input.len() as u64 {
        let mut chunk_id = [0u8; 4];
        cursor.read_exact(&mut chunk_id)?;
        let chunk_size = cursor.read_u32::<LittleEndian>()?;
        let chunk_start = cursor.position();

        match &chunk_id {
            FMT_CHUNK_ID => {
                if chunk_size < STANDARD_FMT_CHUNK_SIZE {
                    return Err(anyhow!("'fmt ' chunk too small: {} bytes", chunk_size));
                }
                let _format_tag = cursor.read_u16::<LittleEndian>()?;
                let channels = cursor.read_u16::<LittleEndian>()?;
                let sample_rate = cursor.read_u32::<LittleEndian>()?;
                cursor.read_u32::<LittleEndian>()?; // byte rate
                let block_align = cursor.read_u16::<LittleEndian>()?;
                let bits_per_sample = cursor.read_u16::<LittleEndian>()?;
                fmt = Some((channels, sample_rate, block_align, bits_per_sample));
            }
            DATA_CHUNK_ID => {
                // Truncated recordings claim more data than the file holds
                let available = input.len() as u64 - chunk_start;
                data_size = Some((chunk_size as u64).min(available));
            }
            _ => {}
        }

        // Skip chunk data and padding in one operation
        let padded = chunk_size as u64 + (chunk_size as u64 % 2);
        cursor.set_position(chunk_start + padded);
    }

    let Some((channels, sample_rate, block_align, bits_per_sample)) = fmt else {
        return Err(anyhow!("Missing 'fmt ' chunk"));
    };
    let Some(data_size) = data_size else {
        return Err(anyhow!("Missing 'data' chunk"));
    };
    if sample_rate == 0 || block_align == 0 {
        return Err(anyhow!(
            "Invalid stream format: rate {}, block align {}",
            sample_rate,
            block_align
        ));
    }

    let info = StreamInfo {
        sample_rate,
        channels,
        bits_per_sample,
        block_align,
        frame_count: data_size / block_align as u64,
    };
    dprintln!("Stream info: {:?}", info);
    Ok(info)
}

/// Body of the first chunk with the given id, if any.
pub fn find_chunk<'a>(input: &'a [u8], id: &[u8; 4]) -> Option<&'a [u8]> {
    let (_, data_start, chunk_size) = walk_chunks(input).find(|(chunk_id, ..)| chunk_id == id)?;
    let data_end = data_start.saturating_add(chunk_size).min(input.len());
    input.get(data_start..data_end)
}

/// Byte ranges of every chunk with the given id, header and padding included.
pub fn find_chunk_spans(input: &[u8], id: &[u8; 4]) -> Vec<Range<usize>> {
    walk_chunks(input)
        .filter(|(chunk_id, ..)| chunk_id == id)
        .map(|(_, data_start, chunk_size)| {
            let end = data_start
                .saturating_add(chunk_size)
                .saturating_add(chunk_size % 2)
                .min(input.len());
            data_start - CHUNK_HEADER_SIZE..end
        })
        .collect()
}

// Yields (id, data offset, declared size) for each chunk header in the file
fn walk_chunks(input: &[u8]) -> impl Iterator<Item = ([u8; 4], usize, usize)> + '_ {
    let mut pos = if validate_file_format(input).is_ok() {
        HEADER_SIZE
    } else {
        input.len()
    };

    std::iter::from_fn(move || {
        if pos.saturating_add(CHUNK_HEADER_SIZE) > input.len() {
            return None;
        }
        let chunk_id = [input[pos], input[pos + 1], input[pos + 2], input[pos + 3]];
        let chunk_size = u32::from_le_bytes([
            input[pos + 4],
            input[pos + 5],
            input[pos + 6],
            input[pos + 7],
        ]) as usize;
        let data_start = pos + CHUNK_HEADER_SIZE;

        // Chunks are word-aligned (padded to even size)
        pos = data_start.saturating_add(chunk_size).saturating_add(chunk_size % 2);
        Some((chunk_id, data_start, chunk_size))
    })
}

pub fn embed_guano_chunk(input: &[u8], guano_text: &str) -> R<Vec<u8>> {
    validate_file_format(input)?;

    let mut cursor = Cursor::new(input);
    let mut output = Cursor::new(Vec::with_capacity(input.len() + guano_text.len() + 16));

    // Copy the RIFF/WAVE header
    let mut riff_header = [0u8; HEADER_SIZE];
    cursor.read_exact(&mut riff_header)?;
    output.write_all(&riff_header)?;

    let mut fmt_chunk_found = false;
    let mut data_chunk_found = false;

    while cursor.position() + CHUNK_HEADER_SIZE as u64 <= input.len() as u64 {
        let mut chunk_id = [0u8; 4];
        cursor.read_exact(&mut chunk_id)?;
        let chunk_size = cursor.read_u32::<LittleEndian>()? as usize;
        let chunk_start = cursor.position() as usize;
        let chunk_end = chunk_start.saturating_add(chunk_size).min(input.len());

        match &chunk_id {
            GUANO_CHUNK_ID => {
                dprintln!("Dropping existing guan chunk ({} bytes)", chunk_size);
            }
            _ => {
                if &chunk_id == FMT_CHUNK_ID {
                    fmt_chunk_found = true;
                }
                if &chunk_id == DATA_CHUNK_ID {
                    data_chunk_found = true;
                }
                if chunk_end - chunk_start < chunk_size {
                    dprintln!(
                        "Chunk {:?} truncated: {} of {} bytes",
                        String::from_utf8_lossy(&chunk_id),
                        chunk_end - chunk_start,
                        chunk_size
                    );
                }
                write_chunk(&mut output, &chunk_id, &input[chunk_start..chunk_end])?;
            }
        }

        let next = chunk_start.saturating_add(chunk_size).saturating_add(chunk_size % 2);
        cursor.set_position(next as u64);
    }

    if !fmt_chunk_found || !data_chunk_found {
        return Err(anyhow!("Invalid WAV file: missing fmt or data chunk"));
    }

    write_chunk(&mut output, GUANO_CHUNK_ID, guano_text.as_bytes())?;

    // Update RIFF chunk size
    let final_size = u32::try_from(output.position() - 8)
        .map_err(|_| anyhow!("WAV file exceeds the 4 GiB RIFF limit"))?;
    let mut result_data = output.into_inner();
    (&mut result_data[4..8]).write_u32::<LittleEndian>(final_size)?;

    Ok(result_data)
}

pub fn replace_file_contents(path: &Path, data: &[u8]) -> R<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Not a file path: {}", path.display()))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".sb2guano.tmp");
    let temp_file = path.with_file_name(temp_name);

    std::fs::write(&temp_file, data)
        .with_context(|| format!("Failed to write {}", temp_file.display()))?;

    match std::fs::rename(&temp_file, path) {
        Ok(_) => Ok(()),
        Err(e) => {
            // As a fallback, try to copy then delete
            let copied = std::fs::copy(&temp_file, path);
            let _ = std::fs::remove_file(&temp_file);
            match copied {
                Ok(_) => Ok(()),
                Err(_) => Err(anyhow::Error::from(e)
                    .context(format!("Failed to replace {}", path.display()))),
            }
        }
    }
}

fn write_chunk<W: Write>(writer: &mut W, id: &[u8], data: &[u8]) -> R<()> {
    let size = u32::try_from(data.len())
        .map_err(|_| anyhow!("Chunk too large: {} bytes", data.len()))?;
    writer.write_all(id)?;
    writer.write_u32::<LittleEndian>(size)?;
    writer.write_all(data)?;
    if data.len() % 2 == 1 {
        writer.write_all(&[0])?; // padding
    }
    Ok(())
}
