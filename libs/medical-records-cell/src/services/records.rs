use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{return_representation, SupabaseClient};
use shared_utils::validation::clean_text;

use crate::models::{Attachment, CreateRecordRequest, MedicalRecord, RecordError, RecordListQuery};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

pub struct MedicalRecordService {
    supabase: SupabaseClient,
    bucket: String,
}

impl MedicalRecordService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            bucket: config.records_bucket.clone(),
        }
    }

    /// Stores the record, uploading its attachment first when there is one.
    pub async fn create_record(
        &self,
        member_id: Uuid,
        physician_id: Option<Uuid>,
        request: CreateRecordRequest,
        auth_token: &str,
    ) -> Result<MedicalRecord, RecordError> {
        debug!("Creating {} record for member {}", request.record_type.as_str(), member_id);

        let title = clean_text(&request.title, "Title", MAX_TITLE_LEN).map_err(RecordError::Validation)?;
        let description = request.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| clean_text(d, "Description", MAX_DESCRIPTION_LEN))
            .transpose()
            .map_err(RecordError::Validation)?;

        let uploaded = match &request.attachment {
            Some(attachment) => Some(self.upload_attachment(member_id, attachment, auth_token).await?),
            None => None,
        };

        let record_data = json!({
            "member_id": member_id,
            "physician_id": physician_id,
            "appointment_id": request.appointment_id,
            "title": title,
            "record_type": request.record_type,
            "description": description,
            "file_url": uploaded.as_ref().map(|(_, url)| url.clone()),
            "file_type": request.attachment.as_ref().map(|a| a.file_type.clone()),
            "created_at": Utc::now().to_rfc3339()
        });

        let record = match self.insert_record(record_data, auth_token).await {
            Ok(record) => record,
            Err(e) => {
                if let Some((object_path, _)) = &uploaded {
                    self.remove_object(object_path, auth_token).await;
                }
                return Err(e);
            }
        };

        info!("Medical record {} created for member {}", record.id, member_id);
        Ok(record)
    }

    async fn insert_record(&self, record_data: Value, auth_token: &str) -> Result<MedicalRecord, RecordError> {
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/medical_records",
            Some(auth_token),
            Some(record_data),
            Some(return_representation()),
        ).await?;

        let row = rows.into_iter().next()
            .ok_or_else(|| RecordError::Database("Failed to create medical record".to_string()))?;
        Ok(serde_json::from_value(row)?)
    }

    pub async fn list_records(
        &self,
        member_id: Uuid,
        query: &RecordListQuery,
        auth_token: &str,
    ) -> Result<Vec<MedicalRecord>, RecordError> {
        let mut path = format!("/rest/v1/medical_records?member_id=eq.{}", member_id);
        if let Some(record_type) = query.record_type {
            path.push_str(&format!("&record_type=eq.{}", record_type.as_str()));
        }
        path.push_str("&order=created_at.desc");

        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let records = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<MedicalRecord>, _>>()?;

        Ok(records)
    }

    pub async fn get_record(
        &self,
        record_id: Uuid,
        auth_token: &str,
    ) -> Result<MedicalRecord, RecordError> {
        let path = format!("/rest/v1/medical_records?id=eq.{}", record_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        let row = result.into_iter().next().ok_or(RecordError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Deletes the row, then its stored file.
    pub async fn delete_record(
        &self,
        record: &MedicalRecord,
        auth_token: &str,
    ) -> Result<(), RecordError> {
        debug!("Deleting medical record: {}", record.id);

        let path = format!("/rest/v1/medical_records?id=eq.{}", record.id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(return_representation()),
        ).await?;

        if deleted.is_empty() {
            return Err(RecordError::NotFound);
        }

        if let Some(object_path) = record.file_url.as_deref().and_then(|url| self.object_path_of(url)) {
            self.remove_object(&object_path, auth_token).await;
        }

        info!("Medical record {} deleted", record.id);
        Ok(())
    }

    async fn upload_attachment(
        &self,
        member_id: Uuid,
        attachment: &Attachment,
        auth_token: &str,
    ) -> Result<(String, String), RecordError> {
        let data = decode_attachment(&attachment.file_data)?;
        let object_path = format!("{}/{}.{}", member_id, Uuid::new_v4(), extension_for(&attachment.file_type));

        self.supabase.upload_object(
            &self.bucket,
            &object_path,
            data,
            &attachment.file_type,
            auth_token,
        ).await.map_err(|e| {
            error!("Attachment upload failed for member {}: {}", member_id, e);
            RecordError::Storage(e.to_string())
        })?;

        let public_url = self.supabase.get_public_url(&self.bucket, &object_path);
        debug!("Attachment stored at {}", public_url);
        Ok((object_path, public_url))
    }

    fn object_path_of(&self, file_url: &str) -> Option<String> {
        let marker = format!("/storage/v1/object/public/{}/", self.bucket);
        file_url.split_once(&marker).map(|(_, path)| path.to_string())
    }

    async fn remove_object(&self, object_path: &str, auth_token: &str) {
        if let Err(e) = self.supabase.delete_object(&self.bucket, object_path, auth_token).await {
            warn!("Could not remove stored object {}: {}", object_path, e);
        }
    }
}

/// Decodes base64 content, accepting a `data:` URL prefix.
pub fn decode_attachment(file_data: &str) -> Result<Vec<u8>, RecordError> {
    let encoded = match file_data.split_once(";base64,") {
        Some((_, data)) => data,
        None => file_data,
    };

    let bytes = BASE64.decode(encoded.trim())
        .map_err(|e| RecordError::InvalidAttachment(format!("not valid base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(RecordError::InvalidAttachment("file is empty".to_string()));
    }
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(RecordError::InvalidAttachment("file exceeds 10 MB".to_string()));
    }

    Ok(bytes)
}

fn extension_for(file_type: &str) -> &str {
    match file_type {
        "application/pdf" => "pdf",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "text/plain" => "txt",
        other => other.rsplit('/').next()
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::TestConfig;

    #[test]
    fn decodes_plain_and_data_url() {
        assert_eq!(decode_attachment("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_attachment("data:text/plain;base64,aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn rejects_garbage_and_empty() {
        assert_matches!(decode_attachment("%%%not base64"), Err(RecordError::InvalidAttachment(_)));
        assert_matches!(decode_attachment(""), Err(RecordError::InvalidAttachment(_)));
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for("application/pdf"), "pdf");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("application/vnd.ms-excel"), "bin");
        assert_eq!(extension_for("dicom"), "dicom");
    }

    #[test]
    fn object_path_is_recovered_from_public_url() {
        let service = MedicalRecordService::new(&TestConfig::default().to_app_config());
        let url = service.supabase.get_public_url("medical-records", "abc/def.pdf");

        assert_eq!(service.object_path_of(&url).as_deref(), Some("abc/def.pdf"));
        assert_eq!(service.object_path_of("https://elsewhere.example/file.pdf"), None);
    }
}
