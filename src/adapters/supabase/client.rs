//! Thin PostgREST client shared by the Supabase adapters.
//!
//! Every request carries the `apikey` and `Authorization: Bearer` headers
//! with the admin key. Error bodies are classified into `StoreError` codes.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::ports::{StoreError, StoreErrorCode};

/// PostgREST error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

/// Connection to one Supabase project.
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    admin_key: SecretString,
    http_client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, admin_key: SecretString) -> Self {
        Self::with_client(base_url, admin_key, reqwest::Client::new())
    }

    pub fn with_client(
        base_url: impl Into<String>,
        admin_key: SecretString,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            admin_key,
            http_client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let key = self.admin_key.expose_secret();
        self.http_client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", key.as_str())
            .bearer_auth(key)
            .header("Accept", "application/json")
    }

    /// `GET /rest/v1/{table}` returning every matching row.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(reqwest::Method::GET, &format!("rest/v1/{}", table))
            .query(query)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        read_json(response, table).await
    }

    /// `POST /rest/v1/{table}`; rows that would conflict are skipped.
    pub async fn insert_ignoring_duplicates<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(reqwest::Method::POST, &format!("rest/v1/{}", table))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        read_json(response, table).await
    }

    /// `PATCH /rest/v1/{table}` returning the updated rows.
    pub async fn update<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("rest/v1/{}", table))
            .query(filter)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        read_json(response, table).await
    }

    /// GET against a non-REST path such as `auth/v1/...`.
    pub async fn get_path<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, StoreError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .query(query)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        read_json(response, path).await
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .field("admin_key", &"[REDACTED]")
            .finish()
    }
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    target: &str,
) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let err = classify(status.as_u16(), &text);
        tracing::error!(target_path = %target, status = status.as_u16(), error = %err, "Supabase request failed");
        return Err(err);
    }
    response
        .json()
        .await
        .map_err(|e| StoreError::decode(format!("Failed to parse {} response: {}", target, e)))
}

/// Maps an HTTP status and PostgREST error body to a store error.
pub(crate) fn classify(status: u16, body: &str) -> StoreError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|p| p.code.as_deref());
    let message = parsed
        .as_ref()
        .and_then(|p| {
            p.message.as_ref().map(|m| match &p.details {
                Some(details) => format!("{} ({})", m, details),
                None => m.clone(),
            })
        })
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

    let kind = match (status, code) {
        (_, Some("PGRST116")) | (404, _) => StoreErrorCode::NotFound,
        (401, _) | (403, _) => StoreErrorCode::Unauthorized,
        (409, _) | (_, Some("23505")) | (_, Some("23503")) | (_, Some("23502")) => {
            StoreErrorCode::Constraint
        }
        _ => StoreErrorCode::Transport,
    };
    StoreError::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_single_row_miss_as_not_found() {
        let err = classify(
            406,
            r#"{"code":"PGRST116","message":"JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert_eq!(err.code, StoreErrorCode::NotFound);
    }

    #[test]
    fn classify_unique_violation_as_constraint() {
        let err = classify(
            409,
            r#"{"code":"23505","message":"duplicate key value","details":"Key (id)=(U1) already exists."}"#,
        );
        assert_eq!(err.code, StoreErrorCode::Constraint);
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn classify_bad_key_as_unauthorized() {
        let err = classify(401, r#"{"message":"Invalid API key"}"#);
        assert_eq!(err.code, StoreErrorCode::Unauthorized);
    }

    #[test]
    fn classify_unparseable_body_keeps_text() {
        let err = classify(502, "Bad Gateway");
        assert_eq!(err.code, StoreErrorCode::Transport);
        assert!(err.message.contains("Bad Gateway"));
    }

    #[test]
    fn base_url_is_trimmed_and_key_redacted() {
        let client = SupabaseClient::new(
            "https://abc.supabase.co/",
            SecretString::new("sb_secret_xyz".to_string()),
        );
        assert_eq!(client.base_url(), "https://abc.supabase.co");
        assert!(!format!("{:?}", client).contains("sb_secret_xyz"));
    }
}
