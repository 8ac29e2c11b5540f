//! RT Structure Set parsing.
//!
//! Regions come from `StructureSetROISequence`; their contours from the
//! `ROIContourSequence` item with the same ROI number. A contour names its
//! slice through the first item of its `ContourImageSequence`.

use std::collections::HashMap;
use std::path::Path;

use dicom::dictionary_std::tags;
use dicom::object::{InMemDicomObject, open_file};
use rtstat_pipeline::{ContourError, ContourInstance, RoiContours, Warning};

use crate::{ReadError, element};

/// Regions read from one structure set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructureSet {
    /// Regions in `StructureSetROISequence` order.
    pub rois: Vec<RoiContours>,
    /// Contours that were dropped.
    pub warnings: Vec<Warning>,
}

/// Extract every region and its contours from a structure set object.
///
/// A region without a matching `ROIContourSequence` item has no
/// contours. ROI items that lack their number or name, contours without
/// a referenced image, and unusable `ContourData` are skipped with a
/// warning; the rest of the set is still read.
#[must_use]
pub fn parse_structure_set(obj: &InMemDicomObject) -> StructureSet {
    let mut set = StructureSet::default();

    let mut by_number: HashMap<i64, &InMemDicomObject> = HashMap::new();
    for item in element::items(obj, tags::ROI_CONTOUR_SEQUENCE) {
        match element::i64(item, tags::REFERENCED_ROI_NUMBER, "ReferencedROINumber") {
            Ok(number) => {
                by_number.entry(number).or_insert(item);
            }
            Err(e) => skip_item("ROI contour item", &e, &mut set.warnings),
        }
    }

    for item in element::items(obj, tags::STRUCTURE_SET_ROI_SEQUENCE) {
        let (number, name) = match roi_identity(item) {
            Ok(identity) => identity,
            Err(e) => {
                skip_item("structure set ROI item", &e, &mut set.warnings);
                continue;
            }
        };
        let contours = by_number
            .get(&number)
            .map(|roi| read_contours(roi, &name, &mut set.warnings))
            .unwrap_or_default();
        tracing::debug!(number, name = %name, contours = contours.len(), "parsed region");
        set.rois.push(RoiContours::new(name, contours));
    }
    set
}

fn roi_identity(item: &InMemDicomObject) -> Result<(i64, String), ReadError> {
    Ok((
        element::i64(item, tags::ROI_NUMBER, "ROINumber")?,
        element::string(item, tags::ROI_NAME, "ROIName")?,
    ))
}

fn skip_item(kind: &str, error: &ReadError, warnings: &mut Vec<Warning>) {
    let w = Warning::Unreadable {
        source_name: kind.to_string(),
        message: error.to_string(),
    };
    tracing::warn!("{w}");
    warnings.push(w);
}

fn read_contours(
    roi: &InMemDicomObject,
    region: &str,
    warnings: &mut Vec<Warning>,
) -> Vec<ContourInstance> {
    let mut out = Vec::new();
    for item in element::items(roi, tags::CONTOUR_SEQUENCE) {
        match contour(item) {
            Ok(c) => out.push(c),
            Err(w) => {
                let w = w.into_warning(region);
                tracing::warn!("{w}");
                warnings.push(w);
            }
        }
    }
    out
}

enum Skipped {
    Contour(ContourError),
    Data(ReadError),
}

impl Skipped {
    fn into_warning(self, region: &str) -> Warning {
        match self {
            Self::Contour(error) => Warning::MalformedContour {
                region: region.to_string(),
                error,
            },
            Self::Data(e) => Warning::Unreadable {
                source_name: format!("contour in region {region}"),
                message: e.to_string(),
            },
        }
    }
}

fn contour(item: &InMemDicomObject) -> Result<ContourInstance, Skipped> {
    let uid = element::items(item, tags::CONTOUR_IMAGE_SEQUENCE)
        .first()
        .and_then(|image| element::optional_string(image, tags::REFERENCED_SOP_INSTANCE_UID))
        .ok_or(Skipped::Contour(ContourError::MissingReference))?;
    let data = match element::floats(item, tags::CONTOUR_DATA, "ContourData") {
        Ok(data) => data,
        Err(ReadError::MissingElement(_)) => Vec::new(),
        Err(e) => return Err(Skipped::Data(e)),
    };
    ContourInstance::from_flat(uid, &data).map_err(Skipped::Contour)
}

/// Open and parse a structure set file.
///
/// # Errors
///
/// Returns [`ReadError::Open`] when the file cannot be read.
pub fn load_structure_set(path: &Path) -> Result<StructureSet, ReadError> {
    let obj = open_file(path).map_err(|e| ReadError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(parse_structure_set(&obj))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use dicom::core::value::DataSetSequence;
    use dicom::core::{DataElement, PrimitiveValue, VR, dicom_value};
    use rtstat_pipeline::Point3;

    use super::*;

    fn roi(number: i32, name: &str) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::ROI_NUMBER, VR::IS, PrimitiveValue::from(number)),
            DataElement::new(tags::ROI_NAME, VR::LO, PrimitiveValue::from(name)),
        ])
    }

    fn contour_item(uid: Option<&str>, data: &[f64]) -> InMemDicomObject {
        let mut elements = vec![DataElement::new(
            tags::CONTOUR_DATA,
            VR::DS,
            PrimitiveValue::F64(data.iter().copied().collect()),
        )];
        if let Some(uid) = uid {
            let image = InMemDicomObject::from_element_iter([DataElement::new(
                tags::REFERENCED_SOP_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from(uid),
            )]);
            elements.push(DataElement::new(
                tags::CONTOUR_IMAGE_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![image]),
            ));
        }
        InMemDicomObject::from_element_iter(elements)
    }

    fn roi_contours(number: i32, items: Vec<InMemDicomObject>) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::REFERENCED_ROI_NUMBER, VR::IS, PrimitiveValue::from(number)),
            DataElement::new(tags::CONTOUR_SEQUENCE, VR::SQ, DataSetSequence::from(items)),
        ])
    }

    fn structure_set(rois: Vec<InMemDicomObject>, contours: Vec<InMemDicomObject>) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("RTSTRUCT")),
            DataElement::new(
                tags::STRUCTURE_SET_ROI_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(rois),
            ),
            DataElement::new(
                tags::ROI_CONTOUR_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(contours),
            ),
        ])
    }

    const TRIANGLE: [f64; 9] = [0.0, 0.0, 5.0, 10.0, 0.0, 5.0, 0.0, 10.0, 5.0];

    #[test]
    fn regions_are_joined_by_number_in_roi_order() {
        let obj = structure_set(
            vec![roi(7, "PTV"), roi(3, "Heart")],
            vec![
                roi_contours(3, vec![contour_item(Some("ct.2"), &TRIANGLE)]),
                roi_contours(
                    7,
                    vec![
                        contour_item(Some("ct.1"), &TRIANGLE),
                        contour_item(Some("ct.2"), &TRIANGLE),
                    ],
                ),
            ],
        );
        let set = parse_structure_set(&obj);

        let names: Vec<&str> = set.rois.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["PTV", "Heart"]);
        assert_eq!(set.rois[0].contours.len(), 2);
        assert_eq!(set.rois[1].contours.len(), 1);
        assert_eq!(set.rois[1].contours[0].referenced_uid, "ct.2");
        assert_eq!(set.rois[0].contours[0].points[1], Point3::new(10.0, 0.0, 5.0));
        assert!(set.warnings.is_empty());
    }

    #[test]
    fn region_without_contours_is_kept_empty() {
        let obj = structure_set(vec![roi(1, "Body"), roi(2, "Empty")], vec![roi_contours(
            1,
            vec![contour_item(Some("ct.1"), &TRIANGLE)],
        )]);
        let set = parse_structure_set(&obj);
        assert_eq!(set.rois.len(), 2);
        assert!(set.rois[1].contours.is_empty());
    }

    #[test]
    fn bad_contours_are_skipped_with_warnings() {
        let obj = structure_set(vec![roi(1, "Cord")], vec![roi_contours(
            1,
            vec![
                contour_item(None, &TRIANGLE),
                contour_item(Some("ct.1"), &TRIANGLE[..8]),
                contour_item(Some("ct.1"), &TRIANGLE),
            ],
        )]);
        let set = parse_structure_set(&obj);
        assert_eq!(set.rois[0].contours.len(), 1);
        assert_eq!(
            set.warnings,
            vec![
                Warning::MalformedContour {
                    region: "Cord".to_string(),
                    error: ContourError::MissingReference,
                },
                Warning::MalformedContour {
                    region: "Cord".to_string(),
                    error: ContourError::IncompleteTriplet(8),
                },
            ]
        );
    }

    #[test]
    fn unreadable_roi_items_are_skipped_with_warnings() {
        let nameless = InMemDicomObject::from_element_iter([DataElement::new(
            tags::ROI_NUMBER,
            VR::IS,
            dicom_value!(I32, [4]),
        )]);
        let unnumbered = InMemDicomObject::from_element_iter([DataElement::new(
            tags::CONTOUR_SEQUENCE,
            VR::SQ,
            DataSetSequence::from(vec![contour_item(Some("ct.1"), &TRIANGLE)]),
        )]);
        let obj = structure_set(vec![roi(1, "Body"), nameless], vec![
            unnumbered,
            roi_contours(1, vec![contour_item(Some("ct.1"), &TRIANGLE)]),
        ]);
        let set = parse_structure_set(&obj);

        assert_eq!(set.rois.len(), 1);
        assert_eq!(set.rois[0].name, "Body");
        assert_eq!(set.rois[0].contours.len(), 1);
        assert_eq!(set.warnings.len(), 2);
        assert!(matches!(
            &set.warnings[0],
            Warning::Unreadable { source_name, message }
                if source_name == "ROI contour item" && message.contains("ReferencedROINumber")
        ));
        assert!(matches!(
            &set.warnings[1],
            Warning::Unreadable { source_name, message }
                if source_name == "structure set ROI item" && message.contains("ROIName")
        ));
    }
}
