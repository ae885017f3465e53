//! Client synthesis: body-less stub modules generated from an API surface and
//! streamed to a build tool one file at a time.

pub mod builder;
pub mod codec;
pub mod extract;
pub mod stub;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::PlugsMap;
use crate::types::{API_DIRECTORY, MODELS_DIRECTORY};

pub use builder::{BuildReport, ClientBuilder};
pub use codec::BuildMessageCodec;
pub use extract::Extractor;
pub use stub::{Stub, StubModule};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("'{name}' in API '{api}' is not a valid identifier")]
    InvalidIdentifier { api: String, name: String },

    #[error("models '{first}' and '{second}' in API '{api}' both import as '{binding}'")]
    ModelBinding {
        api: String,
        binding: String,
        first: String,
        second: String,
    },

    #[error("cannot parse stub module {file}: {reason}")]
    Parse { file: String, reason: String },

    #[error("build message targets an unsafe path: {0}")]
    UnsafePath(String),

    #[error("build route answered with status {0}")]
    Status(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Which directory of the generated client a file lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildDir {
    #[serde(rename = "models")]
    Models,
    #[serde(rename = "APIs")]
    Apis,
}

impl BuildDir {
    pub fn directory(&self) -> &'static str {
        match self {
            BuildDir::Models => MODELS_DIRECTORY,
            BuildDir::Apis => API_DIRECTORY,
        }
    }
}

/// One generated file in transit from the server to the build tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMessage {
    pub file_path: String,
    pub file_content: String,
    pub dir: BuildDir,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugs_map: Option<PlugsMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
}

/// A shared model file shipped verbatim to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub file_name: String,
    pub content: String,
}

impl ModelSource {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
        }
    }

    /// Every regular file in `dir`, sorted by name. Source maps are skipped.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, SynthesisError> {
        let mut entries = tokio::fs::read_dir(dir.as_ref()).await?;
        let mut models = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(".map") {
                continue;
            }
            let content = tokio::fs::read_to_string(entry.path()).await?;
            models.push(Self { file_name, content });
        }

        models.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(models)
    }

    pub fn to_message(&self) -> BuildMessage {
        BuildMessage {
            file_path: self.file_name.clone(),
            file_content: self.content.clone(),
            dir: BuildDir::Models,
            plugs_map: None,
            api_name: None,
        }
    }
}
