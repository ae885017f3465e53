use std::sync::Arc;

use axum::http::{header::CONTENT_TYPE, HeaderValue};
use serde_json::Value;

use crate::api::{ApiDescriptor, ApiSurface, HandlerDescriptor, HandlerResult, InvocationContext, TagBuilder};
use crate::synthesis::{BuildMessageCodec, Extractor, ModelSource};
use crate::types::{BUILD_CLIENT_API, BUILD_CLIENT_FUNCTION};

/// The `clientBuilder` API: one stream handler that writes a build message per
/// generated file as soon as it is extracted
pub fn client_builder_api(surface: Arc<ApiSurface>, models: Arc<Vec<ModelSource>>) -> ApiDescriptor {
    let build = HandlerDescriptor::new(BUILD_CLIENT_FUNCTION, Vec::<String>::new(), move |_args, ctx| {
        let surface = Arc::clone(&surface);
        let models = Arc::clone(&models);
        async move { stream_build_messages(&surface, &models, ctx).await }
    })
    .stream_response();

    ApiDescriptor::new(BUILD_CLIENT_API).handler(build)
}

async fn stream_build_messages(surface: &ApiSurface, models: &[ModelSource], ctx: InvocationContext) -> HandlerResult {
    let writer = ctx.stream()?;
    ctx.response
        .set_header(CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));

    let mut sent = 0usize;
    for message in Extractor::new(surface, models).messages() {
        writer.write(BuildMessageCodec::encode_line(&message)?).await?;
        sent += 1;
    }

    tracing::info!("Streamed {} build messages", sent);
    Ok(Value::Null)
}
