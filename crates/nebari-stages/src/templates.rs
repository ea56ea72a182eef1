//! Static stage template trees.
//!
//! With a template root configured, every file under `<root>/<source>/` is
//! rendered beneath the stage prefix next to the generated `_nebari.tf.json`.

use nebari_core::{FileContent, NebariError, RenderedFiles, Result};
use std::path::Path;
use walkdir::WalkDir;

/// Environment variable naming the template root.
pub const TEMPLATE_DIR_ENV: &str = "NEBARI_TEMPLATE_DIR";

pub fn template_files(root: Option<&Path>, source: &str, prefix: &str) -> Result<RenderedFiles> {
    let mut files = RenderedFiles::new();
    let Some(root) = root else {
        return Ok(files);
    };
    let directory = root.join(source);
    if !directory.is_dir() {
        tracing::debug!(directory = %directory.display(), "no template directory");
        return Ok(files);
    }

    for entry in WalkDir::new(&directory)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".terraform")
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&directory)
            .map_err(|e| NebariError::Stage(e.to_string()))?;
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let bytes = std::fs::read(entry.path())?;
        let content = match String::from_utf8(bytes) {
            Ok(text) => FileContent::Text(text),
            Err(e) => FileContent::Binary(e.into_bytes()),
        };
        files.insert(format!("{}/{}", prefix, relative), content);
    }

    Ok(files)
}
