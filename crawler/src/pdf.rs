use anyhow::{anyhow, Result};

/// Plain text of a PDF document, whitespace collapsed. Empty when the file
/// has no extractable text layer.
pub fn extract_text(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(b"%PDF-") {
        return Err(anyhow!("not a PDF file"));
    }
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("pdf extraction failed: {e}"))?;
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
}
