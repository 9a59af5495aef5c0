use chrono::{Datelike, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Digit,
    Upper,
    Lower,
    Lit(u8),
    OneOf(&'static [u8]),
}

impl Class {
    fn accepts(self, b: u8) -> bool {
        match self {
            Class::Digit => b.is_ascii_digit(),
            Class::Upper => b.is_ascii_uppercase(),
            Class::Lower => b.is_ascii_lowercase(),
            Class::Lit(c) => b == c,
            Class::OneOf(set) => set.contains(&b),
        }
    }
}

use Class::{Digit as D, Lit as L, Lower as Lo, OneOf, Upper as Up};

pub struct NamingConvention {
    pub name: &'static str,
    pattern: &'static [Class],
    /// Offset and length of the timestamp text inside the pattern
    date_span: (usize, usize),
    pub timestamp_format: &'static str,
}

/// e.g. `TransectTestRun1-24Mar11-16,27,56-Myoluc.wav`
#[rustfmt::skip]
const SONOBAT_LEGACY: &[Class] = &[
    OneOf(b" 0123"), D, Up, Lo, Lo, D, D, L(b'-'),
    OneOf(b"012"), D, L(b','), OneOf(b"0123456"), D, L(b','), OneOf(b"0123456"), D,
];

/// e.g. `TransectTestRun1-20110324_162756-Myoluc.wav`
const SONOBAT_YYYY: &[Class] = &[D, D, D, D, D, D, D, D, L(b'_'), D, D, D, D, D, D];

/// e.g. `TransectTestRun1-110324_162756-Myoluc.wav`
const SONOBAT_YY: &[Class] = &[D, D, D, D, D, D, L(b'_'), D, D, D, D, D, D];

/// Titley AR125 raw files, e.g. `AR125_D20110324T162756m123-Myoluc.wav`
#[rustfmt::skip]
const AR125: &[Class] = &[
    L(b'_'), L(b'D'), D, D, D, D, D, D, D, D, L(b'T'), D, D, D, D, D, D, L(b'm'), D, D, D,
];

pub const NAMING_CONVENTIONS: [NamingConvention; 4] = [
    NamingConvention {
        name: "SonoBat legacy",
        pattern: SONOBAT_LEGACY,
        date_span: (0, 16),
        timestamp_format: "%d%b%y-%H,%M,%S",
    },
    NamingConvention {
        name: "SonoBat 4-digit year",
        pattern: SONOBAT_YYYY,
        date_span: (0, 15),
        timestamp_format: "%Y%m%d_%H%M%S",
    },
    NamingConvention {
        name: "SonoBat 2-digit year",
        pattern: SONOBAT_YY,
        date_span: (0, 13),
        timestamp_format: "%y%m%d_%H%M%S",
    },
    NamingConvention {
        name: "AR125 raw",
        pattern: AR125,
        date_span: (1, 16),
        timestamp_format: "D%Y%m%dT%H%M%S",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameMatch {
    pub convention: &'static str,
    pub timestamp: NaiveDateTime,
    pub species: Option<String>,
}

impl NamingConvention {
    /// Leftmost occurrence of the pattern whose timestamp parses.
    pub fn parse(&self, name: &str) -> Option<FilenameMatch> {
        let bytes = name.as_bytes();
        let len = self.pattern.len();
        if bytes.len() < len {
            return None;
        }

        for start in 0..=bytes.len() - len {
            let window = &bytes[start..start + len];
            if !self.pattern.iter().zip(window).all(|(c, &b)| c.accepts(b)) {
                continue;
            }

            let (offset, date_len) = self.date_span;
            // Pattern classes are all ASCII, so the span is valid UTF-8
            let date_text = &name[start + offset..start + offset + date_len];
            let Some(timestamp) = self.parse_timestamp(date_text) else {
                continue;
            };

            return Some(FilenameMatch {
                convention: self.name,
                timestamp,
                species: species_suffix(&name[start + len..]),
            });
        }
        None
    }

    fn parse_timestamp(&self, text: &str) -> Option<NaiveDateTime> {
        // Single-digit days may be space padded (" 4Mar11")
        let text = match text.strip_prefix(' ') {
            Some(rest) => format!("0{}", rest),
            None => text.to_string(),
        };
        let timestamp = NaiveDateTime::parse_from_str(&text, self.timestamp_format).ok()?;
        // chrono reads "%y" 69 as 2069; strptime puts 69-99 in the 1900s
        if self.timestamp_format.contains("%y") && timestamp.year() == 2069 {
            return timestamp.with_year(1969);
        }
        Some(timestamp)
    }
}

/// Try every convention in order; the first match wins.
pub fn parse_filename(name: &str) -> Option<FilenameMatch> {
    NAMING_CONVENTIONS.iter().find_map(|conv| conv.parse(name))
}

fn species_suffix(rest: &str) -> Option<String> {
    let letters = rest.strip_prefix('-')?;
    let end = letters
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(letters.len());
    if end == 0 {
        return None;
    }
    Some(letters[..end].to_string())
}
