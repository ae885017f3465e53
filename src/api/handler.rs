use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::api::context::InvocationContext;
use crate::api::tags::{TagMap, Taggable};
use crate::error::ApiError;
use crate::middleware::Middleware;

pub type HandlerResult = Result<Value, ApiError>;

/// Implementation behind a handler descriptor
pub trait Handler: Send + Sync + 'static {
    fn call(&self, args: Vec<Value>, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Vec<Value>, InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Vec<Value>, ctx: InvocationContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(args, ctx))
    }
}

/// One named handler: declared parameters, implementation and capability tags.
///
/// Parameter names are declared by the API author rather than recovered from
/// the implementation; client stubs are generated from this list.
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: String,
    params: Vec<String>,
    implementation: Arc<dyn Handler>,
    tags: TagMap,
    prepend: Vec<Arc<dyn Middleware>>,
    append: Vec<Arc<dyn Middleware>>,
}

impl HandlerDescriptor {
    pub fn new<I, S, F, Fut>(name: impl Into<String>, params: I, implementation: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Vec<Value>, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            implementation: Arc::new(implementation),
            tags: TagMap::new(),
            prepend: Vec::new(),
            append: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn implementation(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.implementation)
    }

    pub fn prepended(&self) -> &[Arc<dyn Middleware>] {
        &self.prepend
    }

    pub fn appended(&self) -> &[Arc<dyn Middleware>] {
        &self.append
    }

    /// Run `middleware` before core dispatch, after any API-level prepends
    pub fn prepend_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.tags.insert(crate::api::TagKind::PrependMiddleware, Value::Bool(true));
        self.prepend.push(Arc::new(middleware));
        self
    }

    /// Run `middleware` after core dispatch, after any API-level appends
    pub fn append_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.tags.insert(crate::api::TagKind::AppendMiddleware, Value::Bool(true));
        self.append.push(Arc::new(middleware));
        self
    }
}

impl Taggable for HandlerDescriptor {
    fn tag_map(&self) -> &TagMap {
        &self.tags
    }

    fn tag_map_mut(&mut self) -> &mut TagMap {
        &mut self.tags
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("tags", &self.tags)
            .field("prepend", &self.prepend.len())
            .field("append", &self.append.len())
            .finish()
    }
}
