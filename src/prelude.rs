pub use crate::dprintln; // Make the macro available
pub use crate::*;
pub use anyhow::{Context, Result as R, anyhow};
pub use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub use memmap2::MmapOptions;
pub use std::io::{Cursor, Read, Seek, SeekFrom, Write};
pub use std::path::{Path, PathBuf};
