use std::io;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt, TryStreamExt};
use serde_json::json;
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use url::Url;

use crate::synthesis::{BuildDir, BuildMessage, BuildMessageCodec, SynthesisError};
use crate::types::{API_DIRECTORY, BUILD_CLIENT_API, BUILD_CLIENT_FUNCTION, INDEX_FILE, MODELS_DIRECTORY, RESI_ROUTE};

/// Files written by one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// `(api name, file name)` of every stub module, sorted by API name
    pub apis: Vec<(String, String)>,
    pub models: Vec<String>,
    pub index: PathBuf,
}

/// Build-tool side of the synthesis stream: fetches build messages from a
/// running server and writes the client into `out_dir`.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    http: reqwest::Client,
    base_url: Url,
    out_dir: PathBuf,
}

impl ClientBuilder {
    /// Builder for a server mounted under the default prefix
    pub fn new(url: &str, out_dir: impl Into<PathBuf>) -> Result<Self, SynthesisError> {
        Self::with_prefix(url, RESI_ROUTE, out_dir)
    }

    /// `api_prefix` is appended to `url` unless its path already ends with it.
    /// An empty prefix addresses a server mounted at the root.
    pub fn with_prefix(url: &str, api_prefix: &str, out_dir: impl Into<PathBuf>) -> Result<Self, SynthesisError> {
        let mut base_url = Url::parse(url.trim_end_matches('/'))?;
        let prefix: Vec<&str> = api_prefix.split('/').filter(|s| !s.is_empty()).collect();
        let path = base_url.path().to_string();
        let present: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if !present.ends_with(&prefix) {
            let mut segments = base_url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty().extend(prefix);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            out_dir: out_dir.into(),
        })
    }

    pub fn build_url(&self) -> String {
        format!("{}/{}/{}", self.base_url.as_str().trim_end_matches('/'), BUILD_CLIENT_API, BUILD_CLIENT_FUNCTION)
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub async fn build(&self) -> Result<BuildReport, SynthesisError> {
        let url = self.build_url();
        tracing::info!("Building client from {} into {}", url, self.out_dir.display());

        let response = self.http.post(&url).json(&json!({})).send().await?;
        if !response.status().is_success() {
            return Err(SynthesisError::Status(response.status().as_u16()));
        }

        self.reset_dirs().await?;

        let bytes = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let frames = FramedRead::new(StreamReader::new(bytes), BuildMessageCodec::new());
        self.write_messages(frames).await
    }

    /// Remove and recreate the generated directories
    pub async fn reset_dirs(&self) -> Result<(), SynthesisError> {
        for dir in [MODELS_DIRECTORY, API_DIRECTORY] {
            let path = self.out_dir.join(dir);
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            tokio::fs::create_dir_all(&path).await?;
        }
        Ok(())
    }

    /// Write each message as it arrives; files are written concurrently and the
    /// index is generated once every write has finished. An aborted stream
    /// leaves the files written so far in place.
    pub async fn write_messages<S>(&self, messages: S) -> Result<BuildReport, SynthesisError>
    where
        S: Stream<Item = Result<BuildMessage, SynthesisError>>,
    {
        let mut messages = std::pin::pin!(messages);
        let mut writes = JoinSet::new();
        let mut report = BuildReport::default();

        while let Some(message) = messages.next().await {
            let message = message?;
            let path = self.target_path(&message)?;

            match (&message.dir, &message.api_name) {
                (BuildDir::Apis, Some(api)) => report.apis.push((api.clone(), message.file_path.clone())),
                (BuildDir::Models, _) => report.models.push(message.file_path.clone()),
                (BuildDir::Apis, None) => {}
            }

            tracing::debug!("Creating file at {}", path.display());
            writes.spawn(async move { tokio::fs::write(&path, message.file_content).await });
        }

        while let Some(written) = writes.join_next().await {
            written.map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
        }

        report.apis.sort();
        let index = self.out_dir.join(API_DIRECTORY).join(INDEX_FILE);
        tokio::fs::write(&index, index_content(&report.apis)).await?;
        report.index = index;

        tracing::info!("All files written: {} APIs, {} models", report.apis.len(), report.models.len());
        Ok(report)
    }

    fn target_path(&self, message: &BuildMessage) -> Result<PathBuf, SynthesisError> {
        let name = &message.file_path;
        let plain = Path::new(name).file_name().is_some_and(|f| f == name.as_str());
        if !plain || name == INDEX_FILE {
            return Err(SynthesisError::UnsafePath(name.clone()));
        }
        Ok(self.out_dir.join(message.dir.directory()).join(name))
    }
}

/// Index module: imports every stub module, re-applies its tag map and exports
/// the combined API object plus a client factory
pub fn index_content(apis: &[(String, String)]) -> String {
    let imports: Vec<String> = apis
        .iter()
        .map(|(api, file)| format!("import {api}, {{ plugsMap as {api}_plugs }} from './{file}';"))
        .collect();
    let apply: Vec<String> = apis
        .iter()
        .map(|(api, _)| format!("applyPlugs({api}, {api}_plugs);"))
        .collect();
    let fields: Vec<String> = apis.iter().map(|(api, _)| format!("  {api},")).collect();

    format!(
        "// Generated by resi. Do not edit.\n\
         import {{ makeResiImplementationFactory, applyPlugs }} from 'resi/client';\n\
         \n\
         {}\n\
         \n\
         {}\n\
         \n\
         export const resiAPIImplementation = {{\n{}\n}};\n\
         \n\
         export const makeResiClient = makeResiImplementationFactory(resiAPIImplementation);\n",
        imports.join("\n"),
        apply.join("\n"),
        fields.join("\n"),
    )
}
