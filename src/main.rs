use clap::Parser;
use sb2guano_lib::convert_all;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "sb2guano",
    about = "Convert files with SonoBat-format metadata to use GUANO metadata"
)]
struct Cli {
    /// WAV files to convert in place
    #[arg(required = true, value_name = "WAVFILE")]
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let files = if cfg!(windows) {
        expand_arguments(cli.files)
    } else {
        cli.files
    };
    if files.is_empty() {
        eprintln!("No input files");
        std::process::exit(2);
    }

    let summary = convert_all(&files);
    println!();
    println!("{summary}");

    if !summary.all_converted() {
        std::process::exit(1);
    }
}

fn is_wildcard(path: &Path) -> bool {
    path.to_string_lossy().contains(['*', '?'])
}

fn expand_arguments(args: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut files = Vec::with_capacity(args.len());
    for arg in args {
        if !is_wildcard(&arg) {
            files.push(arg);
            continue;
        }
        match expand_wildcard(&arg) {
            Ok(found) if found.is_empty() => eprintln!("No files match {}", arg.display()),
            Ok(found) => files.extend(found),
            Err(e) => eprintln!("Error expanding {}: {e}", arg.display()),
        }
    }
    files
}

/// cmd.exe passes wildcards through unexpanded, so match the pattern against
/// its parent directory ourselves.
fn expand_wildcard(pattern: &Path) -> std::io::Result<Vec<PathBuf>> {
    let dir = match pattern.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name_pattern = pattern
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && wildcard_match(&name_pattern, &name) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

/// `*` matches any run of characters, `?` exactly one. Case-insensitive, as
/// Windows file names are.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    backtrack = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
