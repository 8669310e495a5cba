use crate::model::{ScheduledTask, TodayTask};
use crate::store::{StoreError, TaskStore};
use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Section file names inside the remote document.
pub const TODAY_SECTION: &str = "todaysTasks.json";
pub const SCHEDULED_SECTION: &str = "scheduledTasks.json";

const SECTIONS: [&str; 2] = [TODAY_SECTION, SCHEDULED_SECTION];
const DEFAULT_BASE_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("daygist/", env!("CARGO_PKG_VERSION"));

/// Document store backed by a single private GitHub Gist holding one JSON
/// array file per section.
///
/// The Gists API has no partial update for file contents, so every save is a
/// whole-file overwrite via PATCH. The store remembers the document id it
/// ends up using; callers persist it through [`GistStore::gist_id`] after
/// bootstrap so later sessions reuse the same document.
pub struct GistStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
    gist_id: Mutex<Option<String>>,
}

impl GistStore {
    pub fn new(token: impl Into<String>, gist_id: Option<String>) -> Self {
        GistStore {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            gist_id: Mutex::new(gist_id),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The document id currently in use, once known.
    pub fn gist_id(&self) -> Option<String> {
        self.gist_id.lock().unwrap().clone()
    }

    /// Verify the remembered document exists, or create a fresh one. A
    /// remembered id that now 404s is discarded and replaced, matching how a
    /// deleted document should heal rather than wedge the client.
    pub async fn ensure_document(&self) -> Result<String, StoreError> {
        let remembered = self.gist_id();
        if let Some(id) = remembered {
            match self.fetch_document(&id).await {
                Ok(_) => return Ok(id),
                Err(StoreError::Conflict(_)) => {
                    warn!("remembered document {id} not found, creating a new one");
                    *self.gist_id.lock().unwrap() = None;
                }
                Err(err) => return Err(err),
            }
        }
        self.create_document().await
    }

    /// Patch starter `[]` content into any section file the document lacks.
    pub async fn ensure_sections(&self) -> Result<(), StoreError> {
        let id = self.ensure_document().await?;
        let doc = self.fetch_document(&id).await?;
        let files = doc.get("files").and_then(|f| f.as_object());

        let mut payload = serde_json::Map::new();
        for name in SECTIONS {
            if files.map_or(true, |f| !f.contains_key(name)) {
                payload.insert(name.to_string(), json!({ "content": "[]" }));
            }
        }
        if payload.is_empty() {
            return Ok(());
        }
        debug!("adding missing sections: {:?}", payload.keys().collect::<Vec<_>>());
        self.patch_files(&id, serde_json::Value::Object(payload))
            .await
    }

    async fn fetch_document(&self, id: &str) -> Result<serde_json::Value, StoreError> {
        let response = self
            .client
            .get(format!("{}/gists/{}", self.base_url, id))
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::Conflict(format!("document {id} not found"))),
            status if !status.is_success() => Err(StoreError::Unavailable(format!(
                "fetching document failed ({status})"
            ))),
            _ => response
                .json()
                .await
                .map_err(|err| StoreError::Parse(err.to_string())),
        }
    }

    async fn create_document(&self) -> Result<String, StoreError> {
        let body = json!({
            "description": "daygist task document",
            "public": false,
            "files": {
                TODAY_SECTION: { "content": "[]" },
                SCHEDULED_SECTION: { "content": "[]" },
            },
        });
        let response = self
            .client
            .post(format!("{}/gists", self.base_url))
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(header::USER_AGENT, USER_AGENT)
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "document creation failed ({})",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| StoreError::Parse(err.to_string()))?;
        let id = body
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| StoreError::Parse("document created but no id returned".into()))?;
        debug!("created document {id}");
        *self.gist_id.lock().unwrap() = Some(id.to_string());
        Ok(id.to_string())
    }

    async fn patch_files(
        &self,
        id: &str,
        files: serde_json::Value,
    ) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(format!("{}/gists/{}", self.base_url, id))
            .header(header::AUTHORIZATION, format!("token {}", self.token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .header(header::USER_AGENT, USER_AGENT)
            .json(&json!({ "files": files }))
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::Conflict("remote document missing".into())),
            status if !status.is_success() => Err(StoreError::Unavailable(format!(
                "updating document failed ({status})"
            ))),
            _ => Ok(()),
        }
    }

    async fn load_section<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let id = self.ensure_document().await?;
        let doc = self.fetch_document(&id).await?;
        let content = doc
            .get("files")
            .and_then(|files| files.get(name))
            .and_then(|file| file.get("content"))
            .and_then(|content| content.as_str())
            .unwrap_or("[]");
        serde_json::from_str(content)
            .map_err(|err| StoreError::Parse(format!("section {name}: {err}")))
    }

    async fn save_section<T: Serialize>(&self, name: &str, data: &[T]) -> Result<(), StoreError> {
        let Some(id) = self.gist_id() else {
            return Err(StoreError::Conflict(
                "no document id recorded; log in first".into(),
            ));
        };
        let content = serde_json::to_string_pretty(data)
            .map_err(|err| StoreError::Parse(err.to_string()))?;
        debug!("overwriting section {name} with {} records", data.len());
        self.patch_files(&id, json!({ name: { "content": content } }))
            .await
    }
}

#[async_trait]
impl TaskStore for GistStore {
    async fn load_today(&self) -> Result<Vec<TodayTask>, StoreError> {
        self.load_section(TODAY_SECTION).await
    }

    async fn save_today(&self, tasks: &[TodayTask]) -> Result<(), StoreError> {
        self.save_section(TODAY_SECTION, tasks).await
    }

    async fn load_scheduled(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        self.load_section(SCHEDULED_SECTION).await
    }

    async fn save_scheduled(&self, tasks: &[ScheduledTask]) -> Result<(), StoreError> {
        self.save_section(SCHEDULED_SECTION, tasks).await
    }
}
