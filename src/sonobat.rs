use crate::filename;
use crate::prelude::*;
use crate::wav;
use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

pub const MARKER: &[u8] = b"MMMMMMMMM";

const SAMPLERATE_TAG: (&[u8], &[u8]) = (b"(#", b"#)");
const TE_TAG: (&[u8], &[u8]) = (b"<&", b"&>");
const DFREQ_TAG: (&[u8], &[u8]) = (b"[!", b"!]");

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No Sonobat metadata found")]
    NoMetadata,

    #[error("Malformed Sonobat metadata: {0}")]
    Malformed(String),

    #[error("Unreadable audio container: {0}")]
    Container(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SonobatBlock {
    pub samplerate: u32,
    pub te: u32,
    pub dfreq: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SonobatMetadata {
    pub samplerate: u32,
    pub te: u32,
    pub dfreq: String,
    pub note: String,
    // seconds, container duration / TE
    pub length: f64,
    pub timestamp: Option<NaiveDateTime>,
    pub species: Option<String>,
}

impl fmt::Display for SonobatMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  samplerate: {}", self.samplerate)?;
        writeln!(f, "  te:         {}", self.te)?;
        writeln!(f, "  dfreq:      {}", self.dfreq)?;
        writeln!(f, "  note:       {:?}", self.note)?;
        writeln!(f, "  length:     {}", self.length)?;
        match &self.timestamp {
            Some(ts) => writeln!(f, "  timestamp:  {}", ts)?,
            None => writeln!(f, "  timestamp:  -")?,
        }
        write!(f, "  species:    {}", self.species.as_deref().unwrap_or("-"))
    }
}

// MMMMMMMMM (#rate#) <&te&> [!dfreq!] note MMMMMMMMM
// Runs from the first marker to the last one.
pub fn find_marker_block(data: &[u8]) -> Option<&[u8]> {
    let start = find(data, MARKER, 0)? + MARKER.len();
    let end = rfind(data, MARKER)?;
    if end <= start {
        return None;
    }
    Some(&data[start..end])
}

pub fn parse_block(payload: &[u8]) -> Result<SonobatBlock, ExtractError> {
    let mut pos = 0;

    let (digits, next) = scan_token(payload, pos, SAMPLERATE_TAG, 1, is_digit)
        .ok_or_else(|| missing("samplerate (#...#)"))?;
    let samplerate = parse_u32(digits, "samplerate")?;
    pos = next;

    let (digits, next) =
        scan_token(payload, pos, TE_TAG, 0, is_digit).ok_or_else(|| missing("TE <&...&>"))?;
    // An empty TE token means no time expansion
    let te = if digits.is_empty() {
        1
    } else {
        parse_u32(digits, "TE")?
    };
    if te == 0 {
        return Err(ExtractError::Malformed("TE of 0".to_string()));
    }
    pos = next;

    let (word, next) = scan_token(payload, pos, DFREQ_TAG, 1, is_word)
        .ok_or_else(|| missing("dominant frequency [!...!]"))?;
    let dfreq = String::from_utf8_lossy(word).into_owned();

    let note = String::from_utf8_lossy(&payload[next..]).into_owned();

    Ok(SonobatBlock {
        samplerate,
        te,
        dfreq,
        note,
    })
}

pub fn extract_sonobat_metadata(path: &Path) -> Result<SonobatMetadata, ExtractError> {
    let file = std::fs::File::open(path)?;
    let file_size = file.metadata()?.len();

    // The mapping is dropped at the end of this block, before anyone reopens
    // the file for writing.
    let (block, stream) = {
        let mapped_file;
        let bytes: &[u8] = if file_size == 0 {
            &[]
        } else {
            mapped_file = unsafe { MmapOptions::new().map(&file)? };
            &mapped_file
        };

        let scanned = without_guano_chunks(bytes);
        let payload = find_marker_block(&scanned).ok_or(ExtractError::NoMetadata)?;
        dprintln!("Found {} byte Sonobat block in {}", payload.len(), path.display());
        let block = parse_block(payload)?;

        let stream =
            wav::read_stream_info(bytes).map_err(|e| ExtractError::Container(e.to_string()))?;
        (block, stream)
    };

    let length = stream.duration_secs() / block.te as f64;

    let (timestamp, species) = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| filename::parse_filename(&name))
        .map(|m| (Some(m.timestamp), m.species))
        .unwrap_or((None, None));

    Ok(SonobatMetadata {
        samplerate: block.samplerate,
        te: block.te,
        dfreq: block.dfreq,
        note: block.note,
        length,
        timestamp,
        species,
    })
}

// A GUANO chunk from an earlier run repeats the note, markers included
fn without_guano_chunks(bytes: &[u8]) -> Cow<'_, [u8]> {
    let spans = wav::find_chunk_spans(bytes, wav::GUANO_CHUNK_ID);
    match spans.as_slice() {
        [] => Cow::Borrowed(bytes),
        [span] if span.end == bytes.len() => Cow::Borrowed(&bytes[..span.start]),
        _ => {
            let mut kept = Vec::with_capacity(bytes.len());
            let mut pos = 0;
            for span in &spans {
                kept.extend_from_slice(&bytes[pos..span.start]);
                pos = span.end;
            }
            kept.extend_from_slice(&bytes[pos..]);
            Cow::Owned(kept)
        }
    }
}

fn missing(token: &str) -> ExtractError {
    ExtractError::Malformed(format!("missing {}", token))
}

fn parse_u32(digits: &[u8], field: &str) -> Result<u32, ExtractError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            ExtractError::Malformed(format!(
                "{} out of range: {}",
                field,
                String::from_utf8_lossy(digits)
            ))
        })
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

// Returns the token body and the offset just past `close`
fn scan_token<'a>(
    data: &'a [u8],
    from: usize,
    (open, close): (&[u8], &[u8]),
    min_len: usize,
    accept: fn(u8) -> bool,
) -> Option<(&'a [u8], usize)> {
    let mut search = from;
    while let Some(at) = find(data, open, search) {
        let body_start = at + open.len();
        let body_len = data[body_start..]
            .iter()
            .take_while(|&&b| accept(b))
            .count();
        let body_end = body_start + body_len;
        if body_len >= min_len && data[body_end..].starts_with(close) {
            return Some((&data[body_start..body_end], body_end + close.len()));
        }
        search = at + 1;
    }
    None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
