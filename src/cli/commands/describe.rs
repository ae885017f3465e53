use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::client::ClientSurface;

pub async fn handle(dir: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let surface = ClientSurface::from_dir(dir).await?;

    match output_format {
        OutputFormat::Text => println!("{}", surface.describe("")),
        OutputFormat::Json => {
            let apis: Vec<Value> = surface
                .apis()
                .map(|api| {
                    json!({
                        "name": api.name,
                        "handlers": api.handlers.values().map(|handler| json!({
                            "name": handler.name,
                            "params": handler.params,
                            "tags": handler.tags,
                        })).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({ "apis": apis }))?);
        }
    }
    Ok(())
}
