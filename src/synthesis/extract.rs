use std::collections::BTreeMap;

use crate::api::tags::client_tag_map;
use crate::api::{ApiDescriptor, ApiSurface, PlugsMap};
use crate::synthesis::stub::{is_identifier, model_binding, Stub, StubModule};
use crate::synthesis::{BuildDir, BuildMessage, ModelSource, SynthesisError};
use crate::types::BUILD_CLIENT_API;

/// Turns an API surface into build messages: one stub module per API, then
/// every shared model file verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Extractor<'a> {
    surface: &'a ApiSurface,
    models: &'a [ModelSource],
}

impl<'a> Extractor<'a> {
    pub fn new(surface: &'a ApiSurface, models: &'a [ModelSource]) -> Self {
        Self { surface, models }
    }

    /// Stub module for one API. Only declared parameters and client tags are
    /// read; no implementation detail reaches the output.
    pub fn stub_module(&self, api: &ApiDescriptor) -> Result<StubModule, SynthesisError> {
        let invalid = |name: &str| SynthesisError::InvalidIdentifier {
            api: api.name().to_string(),
            name: name.to_string(),
        };

        if !is_identifier(api.name()) {
            return Err(invalid(api.name()));
        }

        let mut stubs = Vec::new();
        let mut plugs_map = PlugsMap::new();

        for handler in api.handlers() {
            // `name` is taken by the module's own API name field
            if !is_identifier(handler.name()) || handler.name() == "name" {
                return Err(invalid(handler.name()));
            }
            if let Some(param) = handler.params().iter().find(|p| !is_identifier(p)) {
                return Err(invalid(param));
            }

            stubs.push(Stub {
                name: handler.name().to_string(),
                params: handler.params().to_vec(),
            });

            let tags = client_tag_map(&self.surface.effective_tags(api, handler));
            if !tags.is_empty() {
                plugs_map.insert(handler.name().to_string(), tags);
            }
        }

        // Repeated files import once; distinct files must not share a binding
        let mut models: Vec<String> = Vec::new();
        let mut bindings: BTreeMap<String, &str> = BTreeMap::new();
        for model in api.models() {
            if models.contains(model) {
                continue;
            }
            let binding = model_binding(model);
            if !is_identifier(&binding) {
                return Err(invalid(model));
            }
            if let Some(first) = bindings.insert(binding.clone(), model.as_str()) {
                return Err(SynthesisError::ModelBinding {
                    api: api.name().to_string(),
                    binding,
                    first: first.to_string(),
                    second: model.clone(),
                });
            }
            models.push(model.clone());
        }

        Ok(StubModule {
            api_name: api.name().to_string(),
            models,
            stubs,
            plugs_map,
        })
    }

    /// `None` for sources that are not client-facing APIs: empty APIs and the
    /// client builder itself
    pub fn extract_api(&self, api: &ApiDescriptor) -> Result<Option<BuildMessage>, SynthesisError> {
        if api.is_empty() || api.name() == BUILD_CLIENT_API {
            return Ok(None);
        }

        let module = self.stub_module(api)?;
        Ok(Some(BuildMessage {
            file_path: module.file_name(),
            file_content: module.render()?,
            dir: BuildDir::Apis,
            plugs_map: Some(module.plugs_map),
            api_name: Some(module.api_name),
        }))
    }

    /// Lazily produced messages. A file that fails to extract is logged and
    /// skipped; extraction carries on with the next one.
    pub fn messages(self) -> impl Iterator<Item = BuildMessage> + Send + 'a {
        let apis = self.surface.apis().filter_map(move |api| match self.extract_api(api) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("Skipping client stub for API '{}': {}", api.name(), err);
                None
            }
        });
        apis.chain(self.models.iter().map(ModelSource::to_message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{HandlerDescriptor, TagBuilder, TagKind};
    use serde_json::{json, Value};

    fn handler(name: &str, params: &[&str]) -> HandlerDescriptor {
        HandlerDescriptor::new(name, params.to_vec(), |_args, _ctx| async { Ok(Value::Null) })
    }

    #[test]
    fn stubs_and_tag_map_follow_declarations() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("files")
                .handler(handler("a", &["x"]))
                .handler(handler("b", &["y", "z"]).stream_response()),
        );
        let models: Vec<ModelSource> = Vec::new();
        let extractor = Extractor::new(&surface, &models);

        let message = extractor.extract_api(surface.get("files").unwrap()).unwrap().unwrap();
        assert_eq!(message.dir, BuildDir::Apis);
        assert_eq!(message.file_path, "files.js");
        assert_eq!(message.api_name.as_deref(), Some("files"));
        assert!(message.file_content.contains("a(x){}"));
        assert!(message.file_content.contains("b(y,z){}"));
        assert_eq!(
            serde_json::to_value(message.plugs_map.unwrap()).unwrap(),
            json!({"b": {"streamResponse": true}})
        );
    }

    #[test]
    fn model_imports_are_unique() {
        let surface = ApiSurface::new()
            .api(
                ApiDescriptor::new("users")
                    .uses_model("user.js")
                    .uses_model("user.js")
                    .handler(handler("a", &[])),
            )
            .api(
                ApiDescriptor::new("files")
                    .uses_model("a.b.js")
                    .uses_model("a.c.js")
                    .handler(handler("a", &[])),
            );
        let models: Vec<ModelSource> = Vec::new();
        let extractor = Extractor::new(&surface, &models);

        let users = extractor.stub_module(surface.get("users").unwrap()).unwrap();
        assert_eq!(users.models, vec!["user.js".to_string()]);
        assert_eq!(users.render().unwrap().matches("import * as user").count(), 1);

        match extractor.stub_module(surface.get("files").unwrap()) {
            Err(SynthesisError::ModelBinding { binding, first, second, .. }) => {
                assert_eq!(binding, "a");
                assert_eq!(first, "a.b.js");
                assert_eq!(second, "a.c.js");
            }
            other => panic!("expected a binding collision, got {:?}", other),
        }
    }

    #[test]
    fn role_authorization_ships_as_plain_authorization() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("admin").handler(handler("purge", &[]).role_authorization([2, 3])),
        );
        let models: Vec<ModelSource> = Vec::new();
        let module = Extractor::new(&surface, &models)
            .stub_module(surface.get("admin").unwrap())
            .unwrap();
        let tags = &module.plugs_map["purge"];
        assert_eq!(tags.get(&TagKind::WithAuthorization), Some(&json!(true)));
        assert!(!tags.contains_key(&TagKind::RoleAuthorization));
        assert!(!module.render().unwrap().contains("roleAuthorization"));
    }

    #[test]
    fn bad_files_are_skipped_and_others_continue() {
        let surface = ApiSurface::new()
            .api(ApiDescriptor::new("broken").handler(handler("bad-name", &[])))
            .api(ApiDescriptor::new("empty"))
            .api(ApiDescriptor::new("users").handler(handler("get", &["id"])));
        let models = [ModelSource::new("user.js", "export class User {}")];

        let messages: Vec<_> = Extractor::new(&surface, &models).messages().collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].api_name.as_deref(), Some("users"));
        assert_eq!(messages[1].dir, BuildDir::Models);
        assert_eq!(messages[1].file_content, "export class User {}");
    }

    #[test]
    fn client_builder_api_is_not_extracted() {
        let surface = ApiSurface::new().api(ApiDescriptor::new(BUILD_CLIENT_API).handler(handler("build", &[])));
        let models: Vec<ModelSource> = Vec::new();
        assert_eq!(Extractor::new(&surface, &models).messages().count(), 0);
    }
}
