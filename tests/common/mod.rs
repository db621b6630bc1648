#![allow(dead_code)]

use std::path::Path;

use dicom_core::header::DataElement;
use dicom_core::value::PrimitiveValue;
use dicom_core::{Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::mem::InMemDicomObject;
use dicom_object::meta::FileMetaTableBuilder;

/// SOP class used for all seeded test images
pub const TEST_SOP_CLASS: &str = uids::SECONDARY_CAPTURE_IMAGE_STORAGE;

/// Study Root Query/Retrieve - FIND, used as the context SOP class in tests
pub const QR_FIND_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.2.2.1";

/// Deterministic per-instance UID
pub fn sop_instance_uid(instance: u32) -> String {
    format!("1.2.826.0.1.3680043.10.1011.{}", instance)
}

/// Build a minimal image dataset with the given extra attributes
pub fn image_object(instance: u32, extra: &[(Tag, VR, &str)]) -> InMemDicomObject {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(TEST_SOP_CLASS),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(sop_instance_uid(instance)),
    ));
    obj.put(DataElement::new(
        tags::MODALITY,
        VR::CS,
        PrimitiveValue::from("OT"),
    ));
    for (tag, vr, value) in extra {
        obj.put(DataElement::new(*tag, *vr, PrimitiveValue::from(*value)));
    }
    // A small payload so retrieval actually has pixel data to re-read
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OB,
        PrimitiveValue::U8(vec![0u8, 1, 2, 3].into()),
    ));
    obj
}

/// Write a dataset as a part-10 file
pub fn write_image(path: &Path, obj: InMemDicomObject) {
    let file_obj = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(TEST_SOP_CLASS),
        )
        .expect("build file meta");
    file_obj.write_to_file(path).expect("write test image");
}

/// Seed one image file carrying a patient name
pub fn write_patient_image(path: &Path, instance: u32, patient_name: &str) {
    write_image(
        path,
        image_object(instance, &[(tags::PATIENT_NAME, VR::PN, patient_name)]),
    );
}

/// Build a query filter element
pub fn filter(tag: Tag, vr: VR, value: &str) -> dicom_object::mem::InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}
