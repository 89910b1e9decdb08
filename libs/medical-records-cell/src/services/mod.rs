pub mod records;

pub use records::{decode_attachment, MedicalRecordService};
