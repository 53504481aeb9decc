//! Search term lists.

use std::path::Path;

/// Parses one term per line, ignoring blank lines and `#` comments.
#[must_use]
pub fn parse_terms(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Reads a keywords file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn load_terms(path: &Path) -> std::io::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let terms = parse_terms(&contents);
    log::info!("Loaded {} terms from {}", terms.len(), path.display());
    Ok(terms)
}
