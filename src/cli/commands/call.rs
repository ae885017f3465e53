use std::io::Write;
use std::sync::Arc;

use crate::api::TagKind;
use crate::cli::utils::{output_success, output_value, parse_arg};
use crate::cli::OutputFormat;
use crate::client::{ClientOptions, ClientSurface, ErrorHandler, FileTokenStore, ResiClient, TokenStore};

/// Call one handler. Tokens returned by the server are kept in the config
/// directory and sent with later authenticated calls.
pub async fn handle(
    url: &str,
    dir: &str,
    api: &str,
    handler: &str,
    args: &[String],
    prefix: &str,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let surface = ClientSurface::from_dir(dir).await?;
    let streaming = surface
        .handler(api, handler)
        .is_some_and(|h| h.is_tagged(&TagKind::StreamResponse));

    let options = ClientOptions {
        api_prefix: prefix.to_string(),
        token_store: Arc::new(FileTokenStore::in_config_dir()?),
        error_handler: ErrorHandler::Propagate,
        ..Default::default()
    };
    let client = ResiClient::connect(surface, url, options)?;
    let args = args.iter().map(|raw| parse_arg(raw)).collect();

    if streaming {
        let mut stdout = std::io::stdout();
        client
            .call_stream(api, handler, args, |chunk| {
                if let Err(e) = stdout.write_all(&chunk) {
                    tracing::warn!("Failed to write chunk: {}", e);
                }
            })
            .await?;
        stdout.flush()?;
        return Ok(());
    }

    let value = client.call(api, handler, args).await?;
    output_value(&output_format, value.as_ref())
}

pub async fn logout(output_format: OutputFormat) -> anyhow::Result<()> {
    FileTokenStore::in_config_dir()?.clear().await?;
    output_success(&output_format, "Stored token cleared", None)
}
