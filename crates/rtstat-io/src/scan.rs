//! Sort the files of an input directory into CT images and structure
//! sets.

use std::fs;
use std::path::{Path, PathBuf};

use dicom::dictionary_std::tags;
use dicom::object::OpenFileOptions;
use rtstat_pipeline::Warning;

use crate::{ReadError, element, source_name};

/// Modality of an RT Structure Set.
pub const RTSTRUCT: &str = "RTSTRUCT";

/// Files found in a directory, grouped by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryScan {
    /// Image files, in file-name order.
    pub images: Vec<PathBuf>,
    /// RT Structure Set files, in file-name order.
    pub structure_sets: Vec<PathBuf>,
    /// Files that could not be read as DICOM.
    pub warnings: Vec<Warning>,
}

/// Classify every regular file directly inside `dir` by its Modality.
///
/// Only the header is parsed; pixel data is left for
/// [`load_volume`](crate::load_volume).
///
/// # Errors
///
/// Returns [`ReadError::Directory`] if `dir` cannot be listed.
pub fn scan_directory(dir: &Path) -> Result<DirectoryScan, ReadError> {
    let directory = |source| ReadError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(directory)? {
        let path = entry.map_err(directory)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut scan = DirectoryScan::default();
    for path in paths {
        match modality(&path) {
            Ok(Some(m)) if m == RTSTRUCT => scan.structure_sets.push(path),
            Ok(_) => scan.images.push(path),
            Err(e) => {
                let w = Warning::Unreadable {
                    source_name: source_name(&path),
                    message: e.to_string(),
                };
                tracing::warn!("{w}");
                scan.warnings.push(w);
            }
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        images = scan.images.len(),
        structure_sets = scan.structure_sets.len(),
        skipped = scan.warnings.len(),
        "scanned directory"
    );
    Ok(scan)
}

fn modality(path: &Path) -> Result<Option<String>, ReadError> {
    let obj = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|e| ReadError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(element::optional_string(&obj, tags::MODALITY))
}
