use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tallyfeed_import::{read_archive, Observer, StatementEntry};

use crate::config::CamtSettings;

/// Statement archives waiting in `inbound`, sorted by file name. Matches the
/// `.zip` extension in any letter case.
pub fn pending_archives(inbound: &Path) -> io::Result<Vec<PathBuf>> {
    let mut archives = Vec::new();
    for dir_entry in fs::read_dir(inbound)? {
        let path = dir_entry?.path();
        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if is_zip && path.is_file() {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}

/// Reads every pending archive, extracts its statement entries and then moves
/// the archive to the processed folder. Unreadable archives stay in place.
/// An archive that cannot be moved also stays in place, but its entries are
/// still returned.
pub fn collect_entries(
    settings: &CamtSettings,
    observer: &dyn Observer,
) -> anyhow::Result<Vec<StatementEntry>> {
    if !settings.inbound.is_dir() {
        tracing::info!(inbound = %settings.inbound.display(), "no inbound folder, nothing to import");
        return Ok(Vec::new());
    }

    let archives = pending_archives(&settings.inbound)
        .with_context(|| format!("scanning {}", settings.inbound.display()))?;
    let mut entries = Vec::new();

    for archive in archives {
        let file = match File::open(&archive) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(archive = %archive.display(), "skipping archive: {e}");
                continue;
            }
        };
        let documents = match read_archive(BufReader::new(file), observer) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(archive = %archive.display(), "skipping archive: {e}");
                continue;
            }
        };

        let before = entries.len();
        for document in &documents {
            entries.extend(document.entries(observer));
        }
        tracing::info!(
            archive = %archive.display(),
            documents = documents.len(),
            entries = entries.len() - before,
            "archive read"
        );

        if let Err(e) = move_to(&archive, &settings.processed) {
            tracing::warn!(
                archive = %archive.display(),
                processed = %settings.processed.display(),
                "archive left in inbound, could not move it: {e}"
            );
        }
    }

    Ok(entries)
}

/// Moves `file` into `dir`, keeping its name. Falls back to copy and delete
/// when a rename is not possible, e.g. across file systems.
fn move_to(file: &Path, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let name = file
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "archive path has no file name"))?;
    let dest = dir.join(name);
    if fs::rename(file, &dest).is_err() {
        fs::copy(file, &dest)?;
        fs::remove_file(file)?;
    }
    Ok(dest)
}
