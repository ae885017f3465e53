use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::synthesis::builder::ClientBuilder;

pub async fn handle(url: &str, out_dir: &str, prefix: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let builder = ClientBuilder::with_prefix(url, prefix, out_dir)?;
    let report = builder.build().await?;

    if let OutputFormat::Text = output_format {
        for (api, file) in &report.apis {
            println!("  {} -> {}", api, file);
        }
    }

    output_success(
        &output_format,
        &format!(
            "Built {} API(s) and {} model(s) into {}",
            report.apis.len(),
            report.models.len(),
            builder.out_dir().display()
        ),
        Some(json!({
            "apis": report.apis.iter().map(|(api, _)| api).collect::<Vec<_>>(),
            "models": report.models,
            "index": report.index.display().to_string(),
        })),
    )
}
