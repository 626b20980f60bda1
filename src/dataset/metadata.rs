//! HAM10000-style metadata loading and label assignment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::taxonomy::ClassTaxonomy;

use super::split::LabeledImage;

/// One row of the lesion metadata CSV.
#[derive(Debug, Clone, Deserialize)]
pub struct LesionRecord {
    pub lesion_id: String,
    pub image_id: String,
    /// Diagnosis code, lowercase in the source data (e.g. "mel", "nv").
    pub dx: String,
    #[serde(default)]
    pub dx_type: String,
    #[serde(default)]
    pub age: Option<f32>,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub localization: String,
}

/// Load lesion metadata from a CSV file.
///
/// Returns `Ok(None)` when the file does not exist, since the metadata
/// file is optional at startup. Parse failures on an existing file are
/// real errors.
pub fn load_metadata(path: &Path) -> Result<Option<Vec<LesionRecord>>> {
    if !path.is_file() {
        warn!("Metadata file not found at: {}", path.display());
        return Ok(None);
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: LesionRecord = row?;
        records.push(record);
    }

    info!("Loaded {} metadata records from {}", records.len(), path.display());
    Ok(Some(records))
}

/// Join discovered image files against metadata records, producing
/// labeled samples.
///
/// The image file stem must match a record's `image_id`. Images without
/// a record, and records whose diagnosis code is not in the taxonomy,
/// are skipped with a warning.
pub fn label_images(
    images: &[PathBuf],
    records: &[LesionRecord],
    taxonomy: &ClassTaxonomy,
) -> Vec<LabeledImage> {
    let by_image_id: HashMap<&str, &LesionRecord> = records
        .iter()
        .map(|r| (r.image_id.as_str(), r))
        .collect();

    let mut labeled = Vec::new();
    let mut unmatched = 0usize;
    for path in images {
        let stem = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem,
            None => continue,
        };
        let record = match by_image_id.get(stem) {
            Some(record) => record,
            None => {
                unmatched += 1;
                continue;
            }
        };
        match taxonomy.index_of(&record.dx) {
            Some(label) => labeled.push(LabeledImage {
                path: path.clone(),
                label,
            }),
            None => {
                warn!(
                    "Unknown diagnosis code '{}' for image {}, skipping",
                    record.dx, record.image_id
                );
            }
        }
    }

    if unmatched > 0 {
        warn!("{unmatched} images had no metadata record and were skipped");
    }
    info!("Labeled {} of {} discovered images", labeled.len(), images.len());
    labeled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CSV_HEADER: &str = "lesion_id,image_id,dx,dx_type,age,sex,localization\n";

    #[test]
    fn test_missing_metadata_file_is_none() {
        let result = load_metadata(Path::new("/nonexistent/metadata.csv")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_load_metadata_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        fs::write(
            &path,
            format!(
                "{CSV_HEADER}HAM_0001,ISIC_0001,mel,histo,45.0,male,back\n\
                 HAM_0002,ISIC_0002,nv,follow_up,,female,abdomen\n"
            ),
        )
        .unwrap();

        let records = load_metadata(&path).unwrap().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dx, "mel");
        assert_eq!(records[0].age, Some(45.0));
        assert_eq!(records[1].age, None);
    }

    #[test]
    fn test_label_images_joins_on_stem() {
        let taxonomy = ClassTaxonomy::ham10000();
        let records = vec![
            LesionRecord {
                lesion_id: "HAM_0001".into(),
                image_id: "ISIC_0001".into(),
                dx: "mel".into(),
                dx_type: String::new(),
                age: None,
                sex: String::new(),
                localization: String::new(),
            },
            LesionRecord {
                lesion_id: "HAM_0002".into(),
                image_id: "ISIC_0002".into(),
                dx: "zzz".into(),
                dx_type: String::new(),
                age: None,
                sex: String::new(),
                localization: String::new(),
            },
        ];
        let images = vec![
            PathBuf::from("/data/ISIC_0001.jpg"),
            PathBuf::from("/data/ISIC_0002.jpg"),
            PathBuf::from("/data/ISIC_9999.jpg"),
        ];

        let labeled = label_images(&images, &records, &taxonomy);
        // Unknown dx and missing record are both dropped.
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].label, taxonomy.index_of("MEL").unwrap());
    }
}
