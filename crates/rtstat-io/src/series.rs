//! CT series loading.

use std::path::{Path, PathBuf};

use dicom::dictionary_std::tags;
use dicom::object::{InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use rtstat_pipeline::{
    Dimensions, Frame, FrameError, FrameHeader, Orientation, PixelSpacing, Point3, Volume,
    Warning,
};

use crate::{ReadError, element, source_name};

/// Read the geometry and rescale fields of one image.
///
/// `RescaleSlope` and `RescaleIntercept` default to 1 and 0. Values are
/// taken as stored; [`Frame::new`] does the validation.
///
/// # Errors
///
/// Returns [`ReadError::MissingElement`] or
/// [`ReadError::InvalidElement`] for any other field that is absent or
/// unparseable.
pub fn frame_header(obj: &InMemDicomObject) -> Result<FrameHeader, ReadError> {
    let [x, y, z] = element::floats_n(obj, tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient")?;
    let [row, column] = element::floats_n(obj, tags::PIXEL_SPACING, "PixelSpacing")?;
    Ok(FrameHeader {
        instance_uid: element::string(obj, tags::SOP_INSTANCE_UID, "SOPInstanceUID")?,
        dimensions: Dimensions::new(
            element::u32(obj, tags::COLUMNS, "Columns")?,
            element::u32(obj, tags::ROWS, "Rows")?,
        ),
        rescale_slope: element::f64_or(obj, tags::RESCALE_SLOPE, "RescaleSlope", 1.0)?,
        rescale_intercept: element::f64_or(obj, tags::RESCALE_INTERCEPT, "RescaleIntercept", 0.0)?,
        position: Point3::new(x, y, z),
        orientation: Orientation::from_cosines(element::floats_n(
            obj,
            tags::IMAGE_ORIENTATION_PATIENT,
            "ImageOrientationPatient",
        )?),
        spacing: PixelSpacing::new(row, column),
    })
}

/// Open one image file and build its frame.
///
/// The outer result fails when the file cannot be read at all; the
/// inner one when it was read but its header does not describe a usable
/// slice.
///
/// # Errors
///
/// Returns [`ReadError`] when the file cannot be opened, a required
/// element is missing, or the pixel data cannot be decoded.
pub fn read_frame(path: &Path) -> Result<Result<Frame, FrameError>, ReadError> {
    let obj = open_file(path).map_err(|e| ReadError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let header = frame_header(&obj)?;

    // Stored values; the rescale is applied by the frame itself.
    let pixels = obj
        .decode_pixel_data()
        .map_err(|e| ReadError::PixelData(e.to_string()))?
        .to_vec_with_options::<i32>(
            &ConvertOptions::new().with_modality_lut(ModalityLutOption::None),
        )
        .map_err(|e| ReadError::PixelData(e.to_string()))?;

    Ok(Frame::new(header, pixels))
}

/// Load every image in `paths` into a volume.
///
/// Files that cannot be read become [`Warning::Unreadable`] and follow
/// any `warnings` already collected (e.g. by
/// [`scan_directory`](crate::scan_directory)); rejected frames are
/// reported by [`Volume::assemble_with_warnings`].
#[must_use]
pub fn load_volume(paths: &[PathBuf], mut warnings: Vec<Warning>) -> Volume {
    let mut candidates = Vec::with_capacity(paths.len());
    for path in paths {
        match read_frame(path) {
            Ok(candidate) => candidates.push((source_name(path), candidate)),
            Err(e) => {
                let w = Warning::Unreadable {
                    source_name: source_name(path),
                    message: e.to_string(),
                };
                tracing::warn!("{w}");
                warnings.push(w);
            }
        }
    }
    Volume::assemble_with_warnings(candidates, warnings)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dicom::core::header::Header;
    use dicom::core::{DataElement, PrimitiveValue, VR, dicom_value};

    use super::*;

    fn header_elements() -> Vec<dicom::object::mem::InMemElement> {
        vec![
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.840.1")),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(3_u16)),
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                dicom_value!(F64, [-250.0, -200.0, 12.5]),
            ),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                dicom_value!(F64, [1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            ),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, dicom_value!(F64, [0.8, 0.6])),
        ]
    }

    #[test]
    fn header_fields_are_read() {
        let mut elements = header_elements();
        elements.push(DataElement::new(
            tags::RESCALE_INTERCEPT,
            VR::DS,
            PrimitiveValue::from("-1024"),
        ));
        let h = frame_header(&InMemDicomObject::from_element_iter(elements)).unwrap();

        assert_eq!(h.instance_uid, "1.2.840.1");
        assert_eq!(h.dimensions, Dimensions::new(3, 4));
        assert!((h.rescale_slope - 1.0).abs() < f64::EPSILON);
        assert!((h.rescale_intercept - -1024.0).abs() < f64::EPSILON);
        assert_eq!(h.position, Point3::new(-250.0, -200.0, 12.5));
        assert_eq!(h.orientation, Orientation::AXIAL);
        // PixelSpacing is stored row spacing first.
        assert!((h.spacing.row - 0.8).abs() < f64::EPSILON);
        assert!((h.spacing.column - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_geometry_is_reported_by_name() {
        let elements = header_elements()
            .into_iter()
            .filter(|e| e.tag() != tags::IMAGE_ORIENTATION_PATIENT);
        let err = frame_header(&InMemDicomObject::from_element_iter(elements)).unwrap_err();
        assert!(matches!(
            err,
            ReadError::MissingElement("ImageOrientationPatient")
        ));
    }

    #[test]
    fn unreadable_files_are_warned_not_fatal() {
        let dir = std::env::temp_dir().join(format!("rtstat-series-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bogus = dir.join("CT001.dcm");
        std::fs::write(&bogus, b"garbage").unwrap();

        let earlier = Warning::Unreadable {
            source_name: "notes.txt".to_string(),
            message: "not DICOM".to_string(),
        };
        let volume = load_volume(&[bogus], vec![earlier.clone()]);
        assert!(volume.is_empty());
        assert_eq!(volume.warnings().len(), 2);
        assert_eq!(volume.warnings()[0], earlier);
        assert!(matches!(
            &volume.warnings()[1],
            Warning::Unreadable { source_name, .. } if source_name == "CT001.dcm"
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
