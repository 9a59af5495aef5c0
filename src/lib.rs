pub mod filename;
pub mod guano;
mod prelude;
pub mod sonobat;
pub mod translate;
pub mod wav;

use crate::prelude::*;
use guano::{GuanoFile, MetadataSink};
use sonobat::ExtractError;

pub use sonobat::{SonobatMetadata, extract_sonobat_metadata};
pub use translate::{normalize_note, translate};

pub fn debug_println(args: std::fmt::Arguments) {
    if cfg!(debug_assertions) {
        println!("{}", args);
    }
}

// Helper macro to use it like println!
#[macro_export]
macro_rules! dprintln {
    ($($arg:tt)*) => {
        $crate::debug_println(format_args!($($arg)*))
    };
}

/// What happened to one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertOutcome {
    /// GUANO metadata was written; carries the extracted fields
    Converted(SonobatMetadata),
    /// The file carries no SonoBat block and was left untouched
    Skipped,
}

/// Convert one recording's SonoBat metadata to GUANO, rewriting it in place.
///
/// A file without a SonoBat block is `Skipped`. A malformed block, an
/// unreadable container, or a failed write is an error for this file only.
pub fn convert_file(path: &Path) -> R<ConvertOutcome> {
    println!("\n{}", path.display());

    let md = match extract_sonobat_metadata(path) {
        Ok(md) => md,
        Err(ExtractError::NoMetadata) => {
            eprintln!("No Sonobat metadata found in file: {}", path.display());
            eprintln!("Skipping non-Sonobat file: {}", path.display());
            return Ok(ConvertOutcome::Skipped);
        }
        Err(e) => return Err(e.into()),
    };
    println!("{}", md);

    let mut gfile = GuanoFile::open(path)?;
    translate(&md, &mut gfile);
    print!("{}", gfile.render());
    gfile
        .commit()
        .with_context(|| format!("Failed to write GUANO metadata to {}", path.display()))?;

    Ok(ConvertOutcome::Converted(md))
}

/// Per-batch tally of outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, result: &R<ConvertOutcome>) {
        match result {
            Ok(ConvertOutcome::Converted(_)) => self.converted += 1,
            Ok(ConvertOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn all_converted(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} converted, {} skipped, {} failed",
            self.converted, self.skipped, self.failed
        )
    }
}

/// Convert every path in order. One file's failure never stops the batch.
pub fn convert_all<P: AsRef<Path>>(paths: &[P]) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for path in paths {
        let path = path.as_ref();
        let result = convert_file(path);
        if let Err(e) = &result {
            match e.downcast_ref::<ExtractError>() {
                Some(ExtractError::Malformed(_)) => {
                    eprintln!("Failed parsing Sonobat metadata in {}: {}", path.display(), e)
                }
                _ => eprintln!("Error converting {}: {:#}", path.display(), e),
            }
        }
        summary.record(&result);
    }
    summary
}
