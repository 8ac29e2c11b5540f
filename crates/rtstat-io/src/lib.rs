//! rtstat-io: DICOM reader for rtstat.
//!
//! Turns a directory of DICOM files into the in-memory inputs of
//! [`rtstat_pipeline`]: a [`Volume`](rtstat_pipeline::Volume) of CT
//! frames and the regions of an RT Structure Set.
//!
//! Problems confined to one file or one contour become
//! [`Warning`](rtstat_pipeline::Warning)s; only failures that leave
//! nothing to analyse are returned as [`ReadError`].

mod element;
pub mod scan;
pub mod series;
pub mod structure;

use std::path::PathBuf;

pub use scan::{DirectoryScan, scan_directory};
pub use series::{frame_header, load_volume, read_frame};
pub use structure::{StructureSet, load_structure_set, parse_structure_set};

/// Errors that can occur while reading DICOM input.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The file could not be opened or parsed as DICOM.
    #[error("failed to open {}: {message}", path.display())]
    Open {
        /// File that failed.
        path: PathBuf,
        /// Parser explanation.
        message: String,
    },

    /// The input directory could not be listed.
    #[error("failed to read directory {}: {source}", path.display())]
    Directory {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A required element is absent or empty.
    #[error("missing {0}")]
    MissingElement(&'static str),

    /// An element is present but its value cannot be used.
    #[error("invalid {name}: {message}")]
    InvalidElement {
        /// Element keyword.
        name: &'static str,
        /// What was wrong with the value.
        message: String,
    },

    /// Pixel data could not be decoded.
    #[error("failed to decode pixel data: {0}")]
    PixelData(String),

    /// The directory holds no RT Structure Set.
    #[error("no RT Structure Set found in {}", .0.display())]
    NoStructureSet(PathBuf),
}

/// Short name for `path` used in warnings: the file name when there is
/// one.
fn source_name(path: &std::path::Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}
