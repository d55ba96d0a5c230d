use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

use crate::error::BatchError;

fn fs_err(action: &str, path: &Utf8Path, err: io::Error) -> BatchError {
    BatchError::Filesystem(format!("{action} {path}: {err}"))
}

/// Makes `link` point at `target` without copying data.
pub fn link_file(target: &Utf8Path, link: &Utf8Path) -> Result<(), BatchError> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target.as_std_path(), link.as_std_path());
    #[cfg(not(unix))]
    let result = fs::hard_link(target.as_std_path(), link.as_std_path());
    result.map_err(|err| fs_err("link", link, err))
}

pub fn open(path: &Utf8Path) -> Result<File, BatchError> {
    File::open(path.as_std_path()).map_err(|err| fs_err("open", path, err))
}

pub fn create(path: &Utf8Path) -> Result<File, BatchError> {
    File::create(path.as_std_path()).map_err(|err| fs_err("create", path, err))
}

pub fn remove_file(path: &Utf8Path) -> Result<(), BatchError> {
    fs::remove_file(path.as_std_path()).map_err(|err| fs_err("remove", path, err))
}

pub fn rename(from: &Utf8Path, to: &Utf8Path) -> Result<(), BatchError> {
    fs::rename(from.as_std_path(), to.as_std_path()).map_err(|err| fs_err("rename", from, err))
}

/// Rename, falling back to copy-and-delete when source and target live on different
/// filesystems.
pub fn move_file(from: &Utf8Path, to: &Utf8Path) -> Result<(), BatchError> {
    if fs::rename(from.as_std_path(), to.as_std_path()).is_ok() {
        return Ok(());
    }
    fs::copy(from.as_std_path(), to.as_std_path()).map_err(|err| fs_err("copy", from, err))?;
    remove_file(from)
}

pub fn copy_file(from: &Utf8Path, to: &Utf8Path) -> Result<(), BatchError> {
    fs::copy(from.as_std_path(), to.as_std_path())
        .map(|_| ())
        .map_err(|err| fs_err("copy", from, err))
}

/// Appends the decompressed content of `source` (possibly multi-member gzip) to `out`.
pub fn gunzip_into<W: Write>(source: &Utf8Path, out: &mut W) -> Result<u64, BatchError> {
    let mut decoder = MultiGzDecoder::new(BufReader::new(open(source)?));
    io::copy(&mut decoder, out).map_err(|err| fs_err("decompress", source, err))
}

pub fn gunzip_to(source: &Utf8Path, dest: &Utf8Path) -> Result<(), BatchError> {
    let mut out = BufWriter::new(create(dest)?);
    gunzip_into(source, &mut out)?;
    out.flush().map_err(|err| fs_err("write", dest, err))
}

/// Compresses `path` to `<path>.gz` and removes the original, like `gzip <path>`.
pub fn gzip_in_place(path: &Utf8Path) -> Result<Utf8PathBuf, BatchError> {
    let gz_path = Utf8PathBuf::from(format!("{path}.gz"));
    let mut input = BufReader::new(open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(create(&gz_path)?), Compression::default());
    io::copy(&mut input, &mut encoder).map_err(|err| fs_err("compress", path, err))?;
    let mut writer = encoder
        .finish()
        .map_err(|err| fs_err("compress", path, err))?;
    writer.flush().map_err(|err| fs_err("write", &gz_path, err))?;
    remove_file(path)?;
    Ok(gz_path)
}

pub fn list_dir(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BatchError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir.as_std_path()).map_err(|err| fs_err("list", dir, err))? {
        let entry = entry.map_err(|err| fs_err("list", dir, err))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| BatchError::Filesystem(format!("non-utf8 path {}", path.display())))?;
        entries.push(path);
    }
    entries.sort();
    Ok(entries)
}
