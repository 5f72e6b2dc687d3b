//! Import studies from an external repository.
//!
//! Backs `GET /import/external/{id}`: fetches a study archive from a
//! configured repository base URL and relays it as `application/zip`.
//! Any transport or status failure surfaces as a server error; the
//! importer never touches the arena.

use reqwest::Client;

use crate::error::{ImportError, ImportResult};

/// HTTP client for the configured external study repository.
#[derive(Debug, Clone)]
pub struct ExternalImporter {
    base_url: String,
    client: Client,
}

impl ExternalImporter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// URL the given study id resolves to.
    pub fn study_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), id)
    }

    /// Fetch a study archive by repository identifier.
    pub async fn fetch_study(&self, id: &str) -> ImportResult<Vec<u8>> {
        let response = self
            .client
            .get(self.study_url(id))
            .send()
            .await
            .map_err(|e| ImportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImportError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImportError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
