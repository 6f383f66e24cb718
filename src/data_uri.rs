use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::Path;

/// Reads an image and inlines it as a `data:` URI for a chat message.
pub async fn encode(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    Ok(format!("data:{};base64,{}", mime_type(path), STANDARD.encode(bytes)))
}

fn mime_type(path: &Path) -> &'static str {
    let is_png = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("png"));
    if is_png { "image/png" } else { "image/jpeg" }
}
