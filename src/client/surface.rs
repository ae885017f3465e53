use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::api::tags::is_truthy;
use crate::api::{ApiSurface, TagKind, TagMap};
use crate::client::ClientError;
use crate::synthesis::extract::Extractor;
use crate::synthesis::stub::StubModule;
use crate::synthesis::{BuildDir, BuildMessage, ModelSource};
use crate::types::{API_DIRECTORY, INDEX_FILE};

/// One callable stub with its client tag map
#[derive(Debug, Clone, PartialEq)]
pub struct ClientHandler {
    pub name: String,
    pub params: Vec<String>,
    pub tags: TagMap,
}

impl ClientHandler {
    pub fn tag(&self, kind: &TagKind) -> Option<&Value> {
        self.tags.get(kind)
    }

    pub fn is_tagged(&self, kind: &TagKind) -> bool {
        self.tag(kind).is_some_and(is_truthy)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientApi {
    pub name: String,
    pub handlers: BTreeMap<String, ClientHandler>,
}

/// What a client knows about a server: stub names, parameters and tags.
/// No server implementation is part of it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClientSurface {
    apis: BTreeMap<String, ClientApi>,
}

impl ClientSurface {
    /// Apply each module's tag map onto its stubs by name. Tag entries without
    /// a matching stub are ignored.
    pub fn from_modules(modules: impl IntoIterator<Item = StubModule>) -> Self {
        let mut apis = BTreeMap::new();
        for module in modules {
            let StubModule {
                api_name,
                stubs,
                mut plugs_map,
                ..
            } = module;

            let handlers = stubs
                .into_iter()
                .map(|stub| {
                    let tags = plugs_map.remove(&stub.name).unwrap_or_default();
                    let handler = ClientHandler {
                        name: stub.name,
                        params: stub.params,
                        tags,
                    };
                    (handler.name.clone(), handler)
                })
                .collect();

            apis.insert(
                api_name.clone(),
                ClientApi {
                    name: api_name,
                    handlers,
                },
            );
        }
        Self { apis }
    }

    /// Load the `apis/` directory of a generated client
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ClientError> {
        let api_dir = dir.as_ref().join(API_DIRECTORY);
        let mut entries = tokio::fs::read_dir(&api_dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".js") && name != INDEX_FILE {
                files.push((name, entry.path()));
            }
        }
        files.sort();

        let mut modules = Vec::with_capacity(files.len());
        for (name, path) in files {
            let content = tokio::fs::read_to_string(&path).await?;
            modules.push(StubModule::parse(&name, &content)?);
        }
        Ok(Self::from_modules(modules))
    }

    /// From a received build stream. Model messages are ignored.
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = &'a BuildMessage>) -> Result<Self, ClientError> {
        let modules = messages
            .into_iter()
            .filter(|message| message.dir == BuildDir::Apis)
            .map(|message| StubModule::parse(&message.file_path, &message.file_content))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_modules(modules))
    }

    /// Exactly the surface a generated client would see for `surface`
    pub fn from_server(surface: &ApiSurface) -> Result<Self, ClientError> {
        let models: [ModelSource; 0] = [];
        let extractor = Extractor::new(surface, &models);
        let messages: Vec<BuildMessage> = extractor.messages().collect();
        Self::from_messages(&messages)
    }

    pub fn apis(&self) -> impl Iterator<Item = &ClientApi> {
        self.apis.values()
    }

    pub fn handler(&self, api: &str, handler: &str) -> Option<&ClientHandler> {
        self.apis.get(api)?.handlers.get(handler)
    }

    pub fn describe(&self, padding: &str) -> String {
        let mut lines = Vec::new();
        for api in self.apis() {
            lines.push(format!("{} {}", padding, api.name));
            for handler in api.handlers.values() {
                lines.push(format!("{}     {}({})", padding, handler.name, handler.params.join(", ")));
            }
        }
        lines.join("\n")
    }
}
