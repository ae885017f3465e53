//! API surfaces: named collections of handler descriptors and their capability tags.
//!
//! Tags attached here are read by the route binder when serving and by the
//! extractor when synthesizing clients, so both paths see the same map.

pub mod context;
pub mod handler;
pub mod tags;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use context::{InvocationContext, RequestInfo, ResponseHandle, StreamWriter};
pub use handler::{Handler, HandlerDescriptor, HandlerResult};
pub use tags::{KnownTags, PlugsMap, TagBuilder, TagKind, TagMap, Taggable};

use crate::middleware::Middleware;
use tags::{roles_of, roles_payload};

/// A named API and its handlers. API-level tags apply to every handler in it.
#[derive(Clone, Default)]
pub struct ApiDescriptor {
    name: String,
    handlers: BTreeMap<String, HandlerDescriptor>,
    tags: TagMap,
    prepend: Vec<Arc<dyn Middleware>>,
    append: Vec<Arc<dyn Middleware>>,
    models: Vec<String>,
}

impl ApiDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn handler(mut self, handler: HandlerDescriptor) -> Self {
        let name = handler.name().to_string();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!("Handler '{}' registered twice on API '{}', keeping the last", name, self.name);
        }
        self
    }

    /// Shared model file this API's stubs refer to
    pub fn uses_model(mut self, file_name: impl Into<String>) -> Self {
        self.models.push(file_name.into());
        self
    }

    pub fn prepend_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.tags.insert(TagKind::PrependMiddleware, Value::Bool(true));
        self.prepend.push(Arc::new(middleware));
        self
    }

    pub fn append_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.tags.insert(TagKind::AppendMiddleware, Value::Bool(true));
        self.append.push(Arc::new(middleware));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handlers(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.values()
    }

    pub fn get(&self, handler: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(handler)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn prepended(&self) -> &[Arc<dyn Middleware>] {
        &self.prepend
    }

    pub fn appended(&self) -> &[Arc<dyn Middleware>] {
        &self.append
    }
}

impl Taggable for ApiDescriptor {
    fn tag_map(&self) -> &TagMap {
        &self.tags
    }

    fn tag_map_mut(&mut self) -> &mut TagMap {
        &mut self.tags
    }
}

impl fmt::Debug for ApiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiDescriptor")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .field("tags", &self.tags)
            .field("models", &self.models)
            .finish()
    }
}

/// Every API a server exposes, keyed by API name
#[derive(Debug, Clone, Default)]
pub struct ApiSurface {
    apis: BTreeMap<String, ApiDescriptor>,
    known: KnownTags,
}

impl ApiSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api(mut self, api: ApiDescriptor) -> Self {
        self.insert(api);
        self
    }

    pub fn insert(&mut self, api: ApiDescriptor) {
        self.apis.insert(api.name().to_string(), api);
    }

    /// Make a custom tag kind visible to `tags_of` and to synthesized clients
    pub fn register_tag_kind(mut self, name: impl Into<String>) -> Self {
        self.known.register(name);
        self
    }

    pub fn known_tags(&self) -> &KnownTags {
        &self.known
    }

    pub fn apis(&self) -> impl Iterator<Item = &ApiDescriptor> {
        self.apis.values()
    }

    pub fn get(&self, api: &str) -> Option<&ApiDescriptor> {
        self.apis.get(api)
    }

    pub fn lookup(&self, api: &str, handler: &str) -> Option<(&ApiDescriptor, &HandlerDescriptor)> {
        let descriptor = self.apis.get(api)?;
        Some((descriptor, descriptor.get(handler)?))
    }

    /// Tags in force for `handler`: API-level tags overlaid by handler-level
    /// tags, with the two role sets unioned.
    pub fn effective_tags(&self, api: &ApiDescriptor, handler: &HandlerDescriptor) -> TagMap {
        let mut tags = api.tags_of(&self.known);
        tags.extend(handler.tags_of(&self.known));

        let mut roles = roles_of(api.has_tag(&TagKind::RoleAuthorization));
        roles.extend(roles_of(handler.has_tag(&TagKind::RoleAuthorization)));
        if !roles.is_empty() {
            tags.insert(TagKind::RoleAuthorization, roles_payload(&roles));
        }
        tags
    }

    /// Indented listing of APIs and their handlers
    pub fn describe(&self, padding: &str) -> String {
        let mut lines = Vec::new();
        for api in self.apis() {
            lines.push(format!("{} {}", padding, api.name()));
            for handler in api.handlers() {
                lines.push(format!("{}     {}({})", padding, handler.name(), handler.params().join(", ")));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn noop(name: &str) -> HandlerDescriptor {
        HandlerDescriptor::new(name, ["x"], |_args, _ctx| async { Ok(Value::Null) })
    }

    #[test]
    fn api_level_tags_apply_to_every_handler() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("users")
                .with_authorization()
                .handler(noop("a"))
                .handler(noop("b").stream_response()),
        );
        let (api, a) = surface.lookup("users", "a").unwrap();
        let tags = surface.effective_tags(api, a);
        assert_eq!(tags.get(&TagKind::WithAuthorization), Some(&json!(true)));
        assert!(!tags.contains_key(&TagKind::StreamResponse));
    }

    #[test]
    fn role_sets_are_unioned_not_overridden() {
        let surface = ApiSurface::new().api(
            ApiDescriptor::new("admin")
                .role_authorization([1])
                .handler(noop("purge").role_authorization([2, 3])),
        );
        let (api, purge) = surface.lookup("admin", "purge").unwrap();
        let tags = surface.effective_tags(api, purge);
        assert_eq!(
            roles_of(tags.get(&TagKind::RoleAuthorization)),
            BTreeSet::from([1, 2, 3])
        );
    }

    #[test]
    fn describe_lists_handlers_with_params() {
        let surface = ApiSurface::new().api(ApiDescriptor::new("users").handler(noop("get")));
        assert_eq!(surface.describe(""), " users\n     get(x)");
    }
}
