//! In-memory gzip-tar archives for directory transfers

use std::fs;
use std::io::Cursor;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{FtError, Result};

/// Pack the contents of `dir` into a gzip-compressed tar archive
///
/// Entries are stored relative to `dir`, so unpacking recreates the tree
/// under whatever destination the receiver picks.
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    if !dir.is_dir() {
        return Err(FtError::Validation(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", dir)
        .map_err(|e| FtError::io(dir, e))?;

    let encoder = builder.into_inner().map_err(|e| FtError::io(dir, e))?;
    let bytes = encoder.finish().map_err(|e| FtError::io(dir, e))?;

    tracing::debug!("Packed {:?} into {} byte archive", dir, bytes.len());
    Ok(bytes)
}

/// Unpack a gzip-tar archive into `dest`, creating it if needed
///
/// Entries that would escape `dest` are skipped by the tar reader.
pub fn unpack_into(archive: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| FtError::io(dest, e))?;

    let decoder = GzDecoder::new(Cursor::new(archive));
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(|e| FtError::io(dest, e))?;

    tracing::debug!("Unpacked archive into {:?}", dest);
    Ok(())
}
