use byteorder::{LittleEndian, WriteBytesExt};
use chrono::NaiveDate;
use sb2guano_lib::guano::GuanoFile;
use sb2guano_lib::sonobat::ExtractError;
use sb2guano_lib::{BatchSummary, ConvertOutcome, convert_all, convert_file, wav};
use std::io::Write;
use std::path::{Path, PathBuf};

const BLOCK: &[u8] = b"MMMMMMMMM(#250000#)<&10&>[!Peak!]Good call\r\nnext lineMMMMMMMMM";

fn chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
    out.write_all(id).unwrap();
    out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
    out.write_all(body).unwrap();
    if body.len() % 2 == 1 {
        out.push(0);
    }
}

/// Mono 16-bit PCM WAV whose trailing chunk carries `block`.
fn sonobat_wav(sample_rate: u32, frames: u32, block: &[u8]) -> Vec<u8> {
    let mut fmt = Vec::new();
    fmt.write_u16::<LittleEndian>(1).unwrap();
    fmt.write_u16::<LittleEndian>(1).unwrap();
    fmt.write_u32::<LittleEndian>(sample_rate).unwrap();
    fmt.write_u32::<LittleEndian>(sample_rate * 2).unwrap();
    fmt.write_u16::<LittleEndian>(2).unwrap();
    fmt.write_u16::<LittleEndian>(16).unwrap();

    let mut out = Vec::new();
    out.write_all(b"RIFF").unwrap();
    out.write_u32::<LittleEndian>(0).unwrap();
    out.write_all(b"WAVE").unwrap();
    chunk(&mut out, b"fmt ", &fmt);
    chunk(&mut out, b"data", &vec![0u8; frames as usize * 2]);
    chunk(&mut out, b"sbat", block);

    let riff_size = out.len() as u32 - 8;
    (&mut out[4..8]).write_u32::<LittleEndian>(riff_size).unwrap();
    out
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

fn guano_text(path: &Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    let chunk = wav::find_chunk(&bytes, wav::GUANO_CHUNK_ID).expect("guan chunk");
    String::from_utf8(chunk.to_vec()).unwrap()
}

#[test]
fn converts_sonobat_recording_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "Run1-24Mar11-16,27,56-Myoluc.wav",
        &sonobat_wav(250_000, 100_000, BLOCK),
    );

    let ConvertOutcome::Converted(md) = convert_file(&path).unwrap() else {
        panic!("expected a converted file");
    };
    assert_eq!(md.samplerate, 250_000);
    assert_eq!(md.te, 10);
    assert_eq!(md.dfreq, "Peak");
    assert_eq!(md.note, "Good call\r\nnext line");
    assert!((md.length - 0.04).abs() < 1e-12);
    assert_eq!(
        md.timestamp,
        NaiveDate::from_ymd_opt(2011, 3, 24)
            .unwrap()
            .and_hms_opt(16, 27, 56)
    );
    assert_eq!(md.species.as_deref(), Some("Myoluc"));

    let gfile = GuanoFile::open(&path).unwrap();
    let fields = &gfile.metadata;
    assert_eq!(fields.get("GUANO|Version"), Some("1.0"));
    assert_eq!(fields.get("Timestamp"), Some("2011-03-24T16:27:56"));
    assert_eq!(fields.get("TE"), Some("10"));
    assert_eq!(fields.get("Note"), Some("Good call\\nnext line"));
    assert_eq!(fields.get("Species Auto ID"), Some("Myoluc"));
    let length: f64 = fields.get("Length").unwrap().parse().unwrap();
    assert!((length - 0.04).abs() < 1e-12);
    assert!(guano_text(&path).starts_with("GUANO|Version: 1.0\n"));

    // Audio and the original SonoBat block are carried over untouched
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(wav::read_stream_info(&bytes).unwrap().frame_count, 100_000);
    assert_eq!(wav::find_chunk(&bytes, b"sbat"), Some(BLOCK));
}

#[test]
fn length_is_container_duration_over_te() {
    let dir = tempfile::tempdir().unwrap();
    let cases = [
        (384_000u32, 38_400u32, 1u32),
        (44_100, 441_000, 10),
        (500_000, 123_457, 20),
    ];
    for (rate, frames, te) in cases {
        let block = format!("MMMMMMMMM(#{rate}#)<&{te}&>[!Lo!]MMMMMMMMM");
        let wav = sonobat_wav(rate, frames, block.as_bytes());
        let path = write_file(dir.path(), "call.wav", &wav);

        let ConvertOutcome::Converted(md) = convert_file(&path).unwrap() else {
            panic!("expected a converted file");
        };
        let expected = (frames as f64 / rate as f64) / te as f64;
        assert!((md.length - expected).abs() < 1e-12, "{rate} {frames} {te}");
    }
}

#[test]
fn empty_te_omits_te_field() {
    let dir = tempfile::tempdir().unwrap();
    let block = b"MMMMMMMMM(#384000#)<&&>[!Fc!]realtimeMMMMMMMMM";
    let path = write_file(dir.path(), "plain.wav", &sonobat_wav(384_000, 3_840, block));

    let ConvertOutcome::Converted(md) = convert_file(&path).unwrap() else {
        panic!("expected a converted file");
    };
    assert_eq!(md.te, 1);
    assert_eq!(md.timestamp, None);
    assert_eq!(md.species, None);

    let text = guano_text(&path);
    assert!(!text.contains("TE:"));
    assert!(!text.contains("Timestamp:"));
    assert!(!text.contains("Species Auto ID:"));
    assert!(text.contains("Note: realtime\n"));
    assert!(text.contains("Length: 0.01\n"));
}

#[test]
fn file_without_marker_is_skipped_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let original = sonobat_wav(8_000, 80, b"no annotations here");
    let path = write_file(dir.path(), "other.wav", &original);

    assert_eq!(convert_file(&path).unwrap(), ConvertOutcome::Skipped);
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn missing_dfreq_is_a_parse_failure() {
    let dir = tempfile::tempdir().unwrap();
    let original = sonobat_wav(8_000, 80, b"MMMMMMMMM(#250000#)<&10&>no tokenMMMMMMMMM");
    let path = write_file(dir.path(), "broken.wav", &original);

    let err = convert_file(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::Malformed(_))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn marker_in_non_wav_file_is_a_container_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "block.txt", BLOCK);

    let err = convert_file(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ExtractError>(),
        Some(ExtractError::Container(_))
    ));
}

#[test]
fn batch_continues_past_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write_file(
        dir.path(),
        "broken.wav",
        &sonobat_wav(8_000, 80, b"MMMMMMMMM(#250000#)<&10&>MMMMMMMMM"),
    );
    let other = write_file(dir.path(), "other.wav", &sonobat_wav(8_000, 80, b"nothing"));
    let missing = dir.path().join("missing.wav");
    let good = write_file(
        dir.path(),
        "Run1-20110324_162756-Eptfus.wav",
        &sonobat_wav(250_000, 100_000, BLOCK),
    );

    let summary = convert_all(&[broken, other, missing, good.clone()]);
    assert_eq!(
        summary,
        BatchSummary {
            converted: 1,
            skipped: 1,
            failed: 2,
        }
    );
    assert!(!summary.all_converted());
    assert!(guano_text(&good).contains("Species Auto ID: Eptfus\n"));
}

#[test]
fn reconverting_replaces_guano_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "AR125_D20110324T162756m123.wav",
        &sonobat_wav(250_000, 100_000, BLOCK),
    );

    convert_file(&path).unwrap();
    let first = std::fs::read(&path).unwrap();
    convert_file(&path).unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.windows(4).filter(|w| *w == b"guan").count(), 1);
    assert!(guano_text(&path).contains("Timestamp: 2011-03-24T16:27:56\n"));
}

#[test]
fn reconverting_ignores_markers_quoted_in_guano_note() {
    let dir = tempfile::tempdir().unwrap();
    let block = b"MMMMMMMMM(#8000#)<&&>[!X!]aMMMMMMMMMbMMMMMMMMM";
    let path = write_file(dir.path(), "quoted.wav", &sonobat_wav(8_000, 80, block));

    convert_file(&path).unwrap();
    let first = std::fs::read(&path).unwrap();
    for _ in 0..2 {
        let ConvertOutcome::Converted(md) = convert_file(&path).unwrap() else {
            panic!("expected a converted file");
        };
        assert_eq!(md.note, "aMMMMMMMMMb");
    }

    assert_eq!(std::fs::read(&path).unwrap(), first);
    assert!(guano_text(&path).contains("Note: aMMMMMMMMMb\n"));
}

#[test]
fn write_failure_leaves_file_untouched_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let original = sonobat_wav(250_000, 100_000, BLOCK);
    let blocked = write_file(dir.path(), "a.wav", &original);
    // The temporary file cannot be created where a directory already sits
    std::fs::create_dir(dir.path().join("a.wav.sb2guano.tmp")).unwrap();
    let good = write_file(dir.path(), "b.wav", &original);

    let err = convert_file(&blocked).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to write GUANO metadata"));
    assert_eq!(std::fs::read(&blocked).unwrap(), original);

    let summary = convert_all(&[blocked.clone(), good.clone()]);
    assert_eq!(
        summary,
        BatchSummary {
            converted: 1,
            skipped: 0,
            failed: 1,
        }
    );
    assert_eq!(std::fs::read(&blocked).unwrap(), original);
    assert!(guano_text(&good).starts_with("GUANO|Version: 1.0\n"));
}
