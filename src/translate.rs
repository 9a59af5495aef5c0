use crate::guano::*;
use crate::sonobat::SonobatMetadata;

/// Escape line breaks as a literal `\n` after trimming surrounding whitespace.
pub fn normalize_note(note: &str) -> String {
    note.trim().replace("\r\n", "\\n").replace('\n', "\\n")
}

/// Populate `sink` with the GUANO translation of SonoBat metadata.
pub fn translate(md: &SonobatMetadata, sink: &mut dyn MetadataSink) {
    sink.set(VERSION_KEY, GuanoValue::Text(GUANO_VERSION.to_string()));
    if let Some(ts) = md.timestamp {
        sink.set(TIMESTAMP_KEY, ts.into());
    }
    // TE 1 is the GUANO default
    if md.te != 1 {
        sink.set(TE_KEY, md.te.into());
    }
    sink.set(LENGTH_KEY, md.length.into());
    sink.set(NOTE_KEY, normalize_note(&md.note).into());
    if let Some(species) = md.species.as_deref().filter(|s| !s.is_empty()) {
        sink.set(SPECIES_AUTO_ID_KEY, species.into());
    }
}
