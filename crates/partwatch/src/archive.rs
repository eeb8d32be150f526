//! Moves processed files into the archive directory.
//!
//! Name collisions are resolved by probing `{stem}_copy1{ext}`,
//! `{stem}_copy2{ext}`, ... and taking the first free name.

use crate::error::ArchiveError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Move `source` into `dest_dir`, returning the final path.
///
/// After success the source is gone and exactly one new file holds its
/// bytes. On failure the source is left where it was and no partial file
/// remains in `dest_dir`. Refuses a `dest_dir` that resolves to the folder
/// `source` already sits in.
pub fn archive(source: &Path, dest_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let err = |destination: &Path, cause: io::Error| ArchiveError {
        source_path: source.to_path_buf(),
        destination: destination.to_path_buf(),
        cause,
    };

    fs::create_dir_all(dest_dir).map_err(|e| err(dest_dir, e))?;

    let source_dir = source.parent().unwrap_or_else(|| Path::new(""));
    if same_directory(source_dir, dest_dir).unwrap_or(false) {
        return Err(err(
            dest_dir,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive directory is the directory the file is in",
            ),
        ));
    }

    let file_name = source.file_name().ok_or_else(|| {
        err(
            dest_dir,
            io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
        )
    })?;

    let destination = free_destination(dest_dir, &file_name.to_string_lossy());
    move_file(source, &destination).map_err(|e| err(&destination, e))?;

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        "Archived file"
    );
    Ok(destination)
}

/// Whether `a` and `b` resolve to the same directory after following `.`,
/// `..` and symlinks. Both must exist. An empty path means the current one.
pub fn same_directory(a: &Path, b: &Path) -> io::Result<bool> {
    let resolve = |p: &Path| {
        if p.as_os_str().is_empty() {
            fs::canonicalize(".")
        } else {
            fs::canonicalize(p)
        }
    };
    Ok(resolve(a)? == resolve(b)?)
}

/// First path in `dir` not already taken by `name` or its `_copyN` variants.
pub fn free_destination(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !exists(&candidate) {
        return candidate;
    }

    let (stem, ext) = split_name(name);
    (1u64..)
        .map(|n| dir.join(format!("{}_copy{}{}", stem, n, ext)))
        .find(|path| !exists(path))
        .unwrap_or(candidate)
}

// symlink_metadata so a dangling symlink still counts as taken.
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Split `name` into stem and extension (with its dot).
///
/// A leading dot is part of the stem, so `.hidden` has no extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Rename, falling back to copy + remove across filesystems.
fn move_file(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(rename_err) if is_cross_device(&rename_err) => {
            debug!(error = %rename_err, "Rename crossed filesystems, copying instead");
            copy_then_remove(source, destination)
        }
        Err(rename_err) => Err(rename_err),
    }
}

fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV on unix, ERROR_NOT_SAME_DEVICE on windows.
    #[cfg(unix)]
    const CROSS_DEVICE: i32 = 18;
    #[cfg(windows)]
    const CROSS_DEVICE: i32 = 17;
    #[cfg(not(any(unix, windows)))]
    const CROSS_DEVICE: i32 = -1;

    err.raw_os_error() == Some(CROSS_DEVICE)
}

fn copy_then_remove(source: &Path, destination: &Path) -> io::Result<()> {
    let staging = staging_path(destination);

    let staged = fs::copy(source, &staging)
        .and_then(|_| fs::File::open(&staging)?.sync_all())
        .and_then(|_| fs::rename(&staging, destination));
    if let Err(e) = staged {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    if let Err(e) = fs::remove_file(source) {
        // Keep a single copy: undo the archive so the file is retried.
        undo_copy(source, destination);
        return Err(e);
    }
    Ok(())
}

/// Remove an archived copy whose source could not be removed.
/// Returns false when both copies remain.
fn undo_copy(source: &Path, destination: &Path) -> bool {
    match fs::remove_file(destination) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "Could not remove archived copy; file now exists in both places"
            );
            false
        }
    }
}

fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.partial", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    #[test]
    fn split_name_cases() {
        assert_eq!(split_name("part.xlsx"), ("part", ".xlsx"));
        assert_eq!(split_name("part.v2.xlsx"), ("part.v2", ".xlsx"));
        assert_eq!(split_name("README"), ("README", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }

    #[test]
    fn moves_unchanged_when_free() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("part.xlsx");
        write(&src, "payload");
        let out = temp.path().join("out");

        let dest = archive(&src, &out).unwrap();

        assert_eq!(dest, out.join("part.xlsx"));
        assert!(!src.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[test]
    fn collisions_take_copy_suffixes_in_order() {
        let temp = TempDir::new().unwrap();
        let inbox = temp.path().join("in");
        let out = temp.path().join("out");
        fs::create_dir_all(&inbox).unwrap();

        let mut results = Vec::new();
        for round in 0..3 {
            let src = inbox.join("part.xlsx");
            write(&src, &format!("round {}", round));
            results.push(archive(&src, &out).unwrap());
        }

        assert_eq!(
            results,
            vec![
                out.join("part.xlsx"),
                out.join("part_copy1.xlsx"),
                out.join("part_copy2.xlsx"),
            ]
        );
        assert_eq!(fs::read_to_string(out.join("part.xlsx")).unwrap(), "round 0");
        assert_eq!(fs::read_to_string(out.join("part_copy2.xlsx")).unwrap(), "round 2");
    }

    #[test]
    fn extensionless_names_get_plain_suffix() {
        let temp = TempDir::new().unwrap();
        write(&temp.path().join("notes"), "x");
        assert_eq!(
            free_destination(temp.path(), "notes"),
            temp.path().join("notes_copy1")
        );
    }

    #[test]
    fn existing_directory_is_fine() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();

        for i in 0..3 {
            let src = temp.path().join(format!("f{}.xlsx", i));
            write(&src, "x");
            archive(&src, &out).unwrap();
        }
        assert_eq!(fs::read_dir(&out).unwrap().count(), 3);
    }

    #[test]
    fn missing_source_is_an_error_and_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let err = archive(&temp.path().join("gone.xlsx"), &out).unwrap_err();

        assert_eq!(err.destination, out.join("gone.xlsx"));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn copy_fallback_preserves_bytes() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("big.xlsx");
        let bytes: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        fs::write(&src, &bytes).unwrap();
        let dest = temp.path().join("big_copy.xlsx");

        copy_then_remove(&src, &dest).unwrap();

        assert!(!src.exists());
        assert!(!staging_path(&dest).exists());
        assert_eq!(fs::read(&dest).unwrap(), bytes);
    }

    #[test]
    fn refuses_to_archive_into_the_source_directory() {
        let temp = TempDir::new().unwrap();
        let inbox = temp.path().join("Uploads");
        fs::create_dir_all(&inbox).unwrap();
        let src = inbox.join("part.xlsx");
        write(&src, "payload");

        for alias in [
            inbox.join("."),
            inbox.join("..").join("Uploads"),
            fs::canonicalize(&inbox).unwrap(),
        ] {
            let err = archive(&src, &alias).unwrap_err();
            assert_eq!(err.cause.kind(), io::ErrorKind::InvalidInput);
        }

        assert_eq!(fs::read_to_string(&src).unwrap(), "payload");
        assert_eq!(fs::read_dir(&inbox).unwrap().count(), 1);
    }

    #[test]
    fn same_directory_follows_aliases() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();

        assert!(same_directory(&a, &a.join(".")).unwrap());
        assert!(same_directory(&a, &b.join("..").join("a")).unwrap());
        assert!(!same_directory(&a, &b).unwrap());
        assert!(same_directory(&temp.path().join("missing"), &a).is_err());
    }

    #[test]
    fn undo_copy_reports_a_copy_it_cannot_remove() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("part.xlsx");
        write(&src, "x");

        let copy = temp.path().join("copy.xlsx");
        write(&copy, "x");
        assert!(undo_copy(&src, &copy));
        assert!(!copy.exists());

        // remove_file refuses directories, standing in for any removal failure.
        let stuck = temp.path().join("stuck.xlsx");
        fs::create_dir(&stuck).unwrap();
        assert!(!undo_copy(&src, &stuck));
        assert!(stuck.exists());
    }
}
