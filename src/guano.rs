use crate::prelude::*;
use crate::wav;
use chrono::NaiveDateTime;
use std::fmt;

pub const VERSION_KEY: &str = "GUANO|Version";
pub const GUANO_VERSION: &str = "1.0";

pub const TIMESTAMP_KEY: &str = "Timestamp";
pub const TE_KEY: &str = "TE";
pub const LENGTH_KEY: &str = "Length";
pub const NOTE_KEY: &str = "Note";
pub const SPECIES_AUTO_ID_KEY: &str = "Species Auto ID";

#[derive(Debug, Clone, PartialEq)]
pub enum GuanoValue {
    Text(String),
    Int(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
}

impl fmt::Display for GuanoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuanoValue::Text(s) => f.write_str(s),
            GuanoValue::Int(i) => write!(f, "{}", i),
            GuanoValue::Float(x) => {
                // Keep a fractional part so readers see a float ("2.0", not "2")
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{}", x)
                }
            }
            GuanoValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

impl From<&str> for GuanoValue {
    fn from(value: &str) -> Self {
        GuanoValue::Text(value.to_string())
    }
}

impl From<String> for GuanoValue {
    fn from(value: String) -> Self {
        GuanoValue::Text(value)
    }
}

impl From<u32> for GuanoValue {
    fn from(value: u32) -> Self {
        GuanoValue::Int(value as i64)
    }
}

impl From<f64> for GuanoValue {
    fn from(value: f64) -> Self {
        GuanoValue::Float(value)
    }
}

impl From<NaiveDateTime> for GuanoValue {
    fn from(value: NaiveDateTime) -> Self {
        GuanoValue::Timestamp(value)
    }
}

/// Ordered GUANO fields. Setting an existing key replaces its value in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GuanoMetadata {
    pub fields: Vec<(String, String)>,
}

impl GuanoMetadata {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn set(&mut self, key: &str, value: impl Into<GuanoValue>) -> &mut Self {
        let value = value.into().to_string();
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value,
            None => self.fields.push((key.to_string(), value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        let version = self.get(VERSION_KEY).unwrap_or(GUANO_VERSION);
        push_line(&mut text, VERSION_KEY, version);
        for (key, value) in self.fields.iter().filter(|(k, _)| k != VERSION_KEY) {
            push_line(&mut text, key, value);
        }
        text
    }

    // Lines without a colon are ignored
    pub fn parse_text(text: &str) -> Self {
        let mut metadata = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                metadata.set(key.trim(), value.trim());
            }
        }
        metadata
    }
}

impl fmt::Display for GuanoMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn push_line(text: &mut String, key: &str, value: &str) {
    text.push_str(key);
    text.push_str(": ");
    text.push_str(value);
    text.push('\n');
}

/// A key-value metadata store bound to one recording.
pub trait MetadataSink {
    fn set(&mut self, key: &str, value: GuanoValue);

    /// Human-readable dump of everything that `commit` would persist.
    fn render(&self) -> String;

    /// Persist the store back to the recording.
    fn commit(&mut self) -> R<()>;
}

#[derive(Debug)]
pub struct GuanoFile {
    pub path: PathBuf,
    pub metadata: GuanoMetadata,
}

impl GuanoFile {
    pub fn open(path: &Path) -> R<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mapped_file = unsafe { MmapOptions::new().map(&file)? };
        wav::validate_file_format(&mapped_file)?;

        let metadata = match wav::find_chunk(&mapped_file, wav::GUANO_CHUNK_ID) {
            Some(chunk) => {
                let text = String::from_utf8_lossy(chunk);
                let metadata = GuanoMetadata::parse_text(text.trim_end_matches('\0'));
                dprintln!("Loaded {} existing GUANO fields", metadata.fields.len());
                metadata
            }
            None => GuanoMetadata::new(),
        };

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
        })
    }

    pub fn get_filename(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    }
}

impl MetadataSink for GuanoFile {
    fn set(&mut self, key: &str, value: GuanoValue) {
        self.metadata.set(key, value);
    }

    fn render(&self) -> String {
        self.metadata.to_text()
    }

    fn commit(&mut self) -> R<()> {
        let new_data = {
            let file = std::fs::File::open(&self.path)?;
            let mapped_file = unsafe { MmapOptions::new().map(&file)? };
            wav::embed_guano_chunk(&mapped_file, &self.metadata.to_text())?
        };

        wav::replace_file_contents(&self.path, &new_data)?;
        dprintln!("Wrote GUANO metadata to {}", self.get_filename());
        Ok(())
    }
}
