//! Typed access to data elements.
//!
//! Every getter takes the element keyword for error messages. Empty
//! values count as absent.

use dicom::core::Tag;
use dicom::object::InMemDicomObject;

use crate::ReadError;

fn present(obj: &InMemDicomObject, tag: Tag) -> Option<&dicom::object::mem::InMemElement> {
    let elem = obj.element(tag).ok()?;
    match elem.to_str() {
        Ok(s) if s.trim().is_empty() => None,
        _ => Some(elem),
    }
}

fn invalid(name: &'static str, e: impl std::fmt::Display) -> ReadError {
    ReadError::InvalidElement {
        name,
        message: e.to_string(),
    }
}

/// Required string value, trimmed of DICOM padding.
pub fn string(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<String, ReadError> {
    let elem = present(obj, tag).ok_or(ReadError::MissingElement(name))?;
    let s = elem.to_str().map_err(|e| invalid(name, e))?;
    Ok(s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
}

/// Optional string value; `None` when absent or empty.
pub fn optional_string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    present(obj, tag)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
}

/// Required unsigned integer.
pub fn u32(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<u32, ReadError> {
    present(obj, tag)
        .ok_or(ReadError::MissingElement(name))?
        .to_int::<u32>()
        .map_err(|e| invalid(name, e))
}

/// Required signed integer.
pub fn i64(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<i64, ReadError> {
    present(obj, tag)
        .ok_or(ReadError::MissingElement(name))?
        .to_int::<i64>()
        .map_err(|e| invalid(name, e))
}

/// Optional float, or `default` when absent.
pub fn f64_or(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
    default: f64,
) -> Result<f64, ReadError> {
    present(obj, tag).map_or(Ok(default), |e| e.to_float64().map_err(|e| invalid(name, e)))
}

/// Required multi-valued float list.
pub fn floats(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<Vec<f64>, ReadError> {
    present(obj, tag)
        .ok_or(ReadError::MissingElement(name))?
        .to_multi_float64()
        .map_err(|e| invalid(name, e))
}

/// Required float list of exactly `N` values.
pub fn floats_n<const N: usize>(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<[f64; N], ReadError> {
    let values = floats(obj, tag, name)?;
    let count = values.len();
    values
        .try_into()
        .map_err(|_| invalid(name, format!("expected {N} values, got {count}")))
}

/// Items of a sequence element; empty when the element is absent.
pub fn items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag)
        .ok()
        .and_then(|e| e.items())
        .unwrap_or_default()
}
