//! In-memory index of the served image files.
//!
//! The catalog is built once at startup and is logically immutable afterwards:
//! records are never added, removed, or updated while the node is serving.
//! Only metadata is kept in memory; pixel payloads are re-read from disk at
//! retrieve time.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use dicom_dictionary_std::tags;
use dicom_object::{DefaultDicomObject, OpenFileOptions};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Marker file that flags a flat directory of image files
const DICOMDIR_MARKER: &str = "DICOMDIR";

/// Recognized image file extension outside DICOMDIR directories
const IMAGE_EXTENSION: &str = "dcm";

/// Errors that can occur while building the catalog.
///
/// Per-file parse failures are not errors; they are logged and the file is
/// skipped.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("image root '{}' is not a directory", .0.display())]
    RootNotFound(PathBuf),
}

/// One cataloged image: its location and its metadata, pixel data excluded
#[derive(Debug)]
pub struct Record {
    path: PathBuf,
    object: DefaultDicomObject,
}

impl Record {
    pub(crate) fn new(path: PathBuf, object: DefaultDicomObject) -> Self {
        Self { path, object }
    }

    /// Filesystem location of the image; the record's unique key
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The record's metadata
    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }
}

/// The dataset catalog: a mapping of unique file paths to records.
///
/// Iteration order is the path order, so every pass over the catalog is
/// deterministic.
#[derive(Debug, Default)]
pub struct Catalog {
    records: BTreeMap<PathBuf, Record>,
}

impl Catalog {
    /// Scan `root` recursively and index every readable image file.
    ///
    /// A directory containing a `DICOMDIR` marker file is treated as a flat
    /// directory of images: every other file directly inside it is read
    /// regardless of extension. Elsewhere only `.dcm` files are considered.
    /// Files that fail to parse are logged and skipped.
    pub fn build(root: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(root.to_path_buf()));
        }

        let mut records = BTreeMap::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable path");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                if path.join(DICOMDIR_MARKER).is_file() {
                    Self::scan_flat_directory(path, &mut records);
                }
                continue;
            }
            if has_image_extension(path) {
                Self::insert_file(path, &mut records);
            }
        }

        debug!(
            records = records.len(),
            root = %root.display(),
            "catalog scan complete"
        );
        Ok(Self { records })
    }

    /// Read every non-marker file directly inside a DICOMDIR directory
    fn scan_flat_directory(dir: &Path, records: &mut BTreeMap<PathBuf, Record>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "cannot list DICOMDIR directory");
                return;
            }
        };
        for child in entries.flatten() {
            let path = child.path();
            if path.is_file() && path.file_name() != Some(OsStr::new(DICOMDIR_MARKER)) {
                Self::insert_file(&path, records);
            }
        }
    }

    /// Parse one candidate file and add it to the index.
    ///
    /// Already-indexed paths are not re-read, which keeps the scan idempotent
    /// when the walk visits the same file twice.
    fn insert_file(path: &Path, records: &mut BTreeMap<PathBuf, Record>) {
        if records.contains_key(path) {
            return;
        }
        match read_metadata(path) {
            Ok(object) => {
                records.insert(path.to_path_buf(), Record::new(path.to_path_buf(), object));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse image file, skipping");
            }
        }
    }

    /// Number of indexed records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the catalog holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up one record by path
    pub fn get(&self, path: &Path) -> Option<&Record> {
        self.records.get(path)
    }

    /// Iterate records in path order
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Iterate indexed paths in order
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.records.keys().map(PathBuf::as_path)
    }
}

/// Parse a file's metadata, stopping before the pixel payload
fn read_metadata(path: &Path) -> Result<DefaultDicomObject, dicom_object::ReadError> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
}

/// Read one full record back from storage, pixel data included
pub fn read_full(path: &Path) -> Result<DefaultDicomObject, dicom_object::ReadError> {
    dicom_object::open_file(path)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(IMAGE_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::header::DataElement;
    use dicom_core::value::PrimitiveValue;
    use dicom_core::VR;
    use dicom_dictionary_std::uids;
    use dicom_object::mem::InMemDicomObject;
    use dicom_object::meta::FileMetaTableBuilder;

    fn write_image(path: &Path, instance: u32, patient_name: &str) {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
        ));
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(format!("1.2.826.0.1.3680043.10.1011.{}", instance)),
        ));
        obj.put(DataElement::new(
            tags::MODALITY,
            VR::CS,
            PrimitiveValue::from("OT"),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from(patient_name),
        ));
        obj.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::U8(vec![0u8, 1, 2, 3].into()),
        ));

        let file_obj = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
            )
            .expect("build file meta");
        file_obj.write_to_file(path).expect("write test image");
    }

    #[test]
    fn test_scan_extensions_and_dicomdir_convention() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_image(&dir.path().join("a.dcm"), 1, "DOE^JOHN");
        write_image(&dir.path().join("b.DCM"), 2, "DOE^JOHN");
        std::fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();

        // Flat directory: marker plus an extensionless image
        let flat = dir.path().join("study1");
        std::fs::create_dir(&flat).unwrap();
        std::fs::write(flat.join("DICOMDIR"), b"marker").unwrap();
        write_image(&flat.join("IM000001"), 3, "SMITH^JANE");

        let catalog = Catalog::build(dir.path()).expect("build catalog");
        assert_eq!(catalog.len(), 3);
        assert!(catalog.get(&flat.join("IM000001")).is_some());
        assert!(catalog.get(&dir.path().join("notes.txt")).is_none());
        assert!(catalog.get(&flat.join("DICOMDIR")).is_none());
    }

    #[test]
    fn test_parse_failure_is_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_image(&dir.path().join("good.dcm"), 1, "DOE^JOHN");
        std::fs::write(dir.path().join("broken.dcm"), b"garbage bytes").unwrap();

        let catalog = Catalog::build(dir.path()).expect("build catalog");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&dir.path().join("broken.dcm")).is_none());
    }

    #[test]
    fn test_catalog_excludes_pixel_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.dcm");
        write_image(&path, 1, "DOE^JOHN");

        let catalog = Catalog::build(dir.path()).expect("build catalog");
        let record = catalog.get(&path).expect("record present");
        assert!(record.object().element(tags::PIXEL_DATA).is_err());
        assert!(record.object().element(tags::PATIENT_NAME).is_ok());

        // The full re-read brings the payload back
        let full = read_full(&path).expect("full read");
        assert!(full.element(tags::PIXEL_DATA).is_ok());
    }

    #[test]
    fn test_build_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (i, name) in ["c.dcm", "a.dcm", "b.dcm"].iter().enumerate() {
            write_image(&dir.path().join(name), i as u32, "DOE^JOHN");
        }

        let first: Vec<_> = Catalog::build(dir.path())
            .expect("build")
            .paths()
            .map(Path::to_path_buf)
            .collect();
        let second: Vec<_> = Catalog::build(dir.path())
            .expect("build")
            .paths()
            .map(Path::to_path_buf)
            .collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(matches!(
            Catalog::build(&missing),
            Err(CatalogError::RootNotFound(_))
        ));
    }
}
