use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Upstream failure with the HTTP status PostgREST, GoTrue or Storage answered with.
#[derive(Error, Debug, Clone)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SupabaseError {
    fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => SupabaseError::Auth(message),
            404 => SupabaseError::NotFound(message),
            // 23505 unique_violation and 23P01 exclusion_violation both come back as 409
            409 => SupabaseError::Conflict(message),
            _ => SupabaseError::Api { status, message },
        }
    }
}

/// Returns the `SupabaseError` at the root of an anyhow chain, if there is one.
pub fn supabase_error(err: &anyhow::Error) -> Option<&SupabaseError> {
    err.downcast_ref::<SupabaseError>()
}

pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(supabase_error(err), Some(SupabaseError::Conflict(_)))
}

/// Headers asking PostgREST to echo inserted/updated rows back.
pub fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Anonymous reads still need a bearer for PostgREST to pick the anon role
        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(SupabaseError::from_status(status.as_u16(), error_text).into());
        }

        // 204 and minimal-return writes come back with an empty body
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return serde_json::from_value(Value::Null)
                .map_err(|e| anyhow!("Empty response body where data was expected: {}", e));
        }

        let data = serde_json::from_slice::<T>(&bytes)?;
        Ok(data)
    }

    /// Runs a write whose response body is not needed.
    pub async fn execute(&self, method: Method, path: &str,
                         auth_token: Option<&str>, body: Option<Value>) -> Result<()> {
        let _: Value = self.request(method, path, auth_token, body).await?;
        Ok(())
    }

    /// Calls a GoTrue endpoint under `/auth/v1`, e.g. `signup` or `token?grant_type=password`.
    pub async fn auth_request(&self, endpoint: &str, body: Value) -> Result<Value> {
        let path = format!("/auth/v1/{}", endpoint);
        self.request(Method::POST, &path, None, Some(body)).await
    }

    /// Uploads raw bytes into a storage bucket.
    pub async fn upload_object(
        &self,
        bucket: &str,
        object_path: &str,
        data: Vec<u8>,
        content_type: &str,
        auth_token: &str,
    ) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, object_path);
        debug!("Uploading {} bytes to {}", data.len(), url);

        let mut headers = self.get_headers(Some(auth_token))?;
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);

        let response = self.client.post(&url)
            .headers(headers)
            .body(data)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Storage upload failed ({}): {}", status, error_text);
            return Err(SupabaseError::from_status(status.as_u16(), error_text).into());
        }

        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, object_path: &str, auth_token: &str) -> Result<()> {
        let path = format!("/storage/v1/object/{}/{}", bucket, object_path);
        self.execute(Method::DELETE, &path, Some(auth_token), None).await
    }

    pub fn get_public_url(&self, bucket: &str, object_path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, object_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use wiremock::matchers::{header, method, path};

    fn config(url: &str) -> AppConfig {
        AppConfig {
            supabase_url: url.to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            records_bucket: "medical-records".to_string(),
            default_currency: "USD".to_string(),
            server_port: 3000,
        }
    }

    #[tokio::test]
    async fn request_sends_apikey_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/physicians"))
            .and(header("apikey", "anon"))
            .and(header("Authorization", "Bearer user-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server.uri()));
        let rows: Vec<Value> = client
            .request(Method::GET, "/rest/v1/physicians", Some("user-token"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn conflict_status_is_recognisable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/appointments"))
            .respond_with(ResponseTemplate::new(409).set_body_string("exclusion_violation"))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server.uri()));
        let err = client
            .request::<Vec<Value>>(Method::POST, "/rest/v1/appointments", Some("t"), Some(json!({})))
            .await
            .unwrap_err();

        assert!(is_conflict(&err));
        assert_matches!(supabase_error(&err), Some(SupabaseError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_body_deserializes_as_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/schedule_slots"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = SupabaseClient::new(&config(&server.uri()));
        client
            .execute(Method::DELETE, "/rest/v1/schedule_slots", Some("t"), None)
            .await
            .unwrap();
    }

    #[test]
    fn public_url_points_at_public_bucket_path() {
        let client = SupabaseClient::new(&config("http://localhost:54321/"));
        assert_eq!(
            client.get_public_url("medical-records", "m1/file.pdf"),
            "http://localhost:54321/storage/v1/object/public/medical-records/m1/file.pdf"
        );
    }
}
