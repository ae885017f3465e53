use serde_json::json;

use crate::auth::SecurityKeys;
use crate::cli::OutputFormat;

/// Prints `SECURITY_*` lines ready for a `.env` file
pub fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let (private_key, public_key, secret) = SecurityKeys::generate().to_base64();

    match output_format {
        OutputFormat::Text => {
            println!("SECURITY_PRIVATE_KEY={}", private_key);
            println!("SECURITY_PUBLIC_KEY={}", public_key);
            println!("SECURITY_SECRET={}", secret);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "private_key": private_key,
                    "public_key": public_key,
                    "secret": secret,
                }))?
            );
        }
    }
    Ok(())
}
