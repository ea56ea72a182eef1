//! Render/diff engine
//!
//! Computes what the stage set would write and compares it with the output
//! directory by SHA-256 digest. The resulting [`RenderPlan`] is applied
//! separately: it writes new and updated files and removes deprecated paths.

use crate::error::{NebariError, Result};
use crate::stage::{FileContent, RenderedFiles, Stage};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Directories never descended into when hashing the output tree.
pub const IGNORED_DIRECTORIES: &[&str] = &[".terraform", "__pycache__"];

/// Engine state files that are never reported.
pub const IGNORED_FILES: &[&str] = &[
    "terraform.tfstate",
    ".terraform.lock.hcl",
    "terraform.tfstate.backup",
];

/// Legacy paths removed on render when no stage renders them any more.
pub const DEPRECATED_FILE_PATHS: &[&str] = &[
    "infrastructure",
    "terraform-state",
    ".github/workflows/image-pr.yaml",
    ".github/workflows/image.yaml",
    ".github/workflows/jupyterhub-pr.yaml",
    ".github/workflows/jupyterhub.yaml",
    "stages/07-kubernetes-services/modules/kubernetes/services/dask-gateway/controler.tf",
];

/// Classification of every path involved in a render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderDiff {
    pub new: BTreeSet<String>,
    pub updated: BTreeSet<String>,
    pub untracked: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
}

impl RenderDiff {
    /// Nothing to write and nothing to delete.
    pub fn is_clean(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Concatenates every stage's files in stage order. Later stages win on conflicts.
pub fn collect_rendered(stages: &[Box<dyn Stage>]) -> Result<RenderedFiles> {
    let mut contents = RenderedFiles::new();
    for stage in stages {
        for (path, content) in stage.render()? {
            if contents.insert(path.clone(), content).is_some() {
                tracing::warn!(stage = stage.name(), path = %path, "rendered file overwrites an earlier stage's file");
            }
        }
    }
    Ok(contents)
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hashes every file under `root`, keyed by `/`-separated relative path.
pub fn hash_directory(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut hashes = BTreeMap::new();
    if !root.exists() {
        return Ok(hashes);
    }

    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        let ignored_dir = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| IGNORED_DIRECTORIES.contains(&name));
        !ignored_dir
    });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_FILES.contains(&name))
        {
            continue;
        }
        let relative = entry.path().strip_prefix(root).map_err(|_| NebariError::PathEscape {
            path: entry.path().display().to_string(),
            root: root.to_path_buf(),
        })?;
        let bytes = std::fs::read(entry.path())?;
        hashes.insert(slash_path(relative), hash_bytes(&bytes));
    }

    Ok(hashes)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Classifies paths into new/updated/untracked/deleted.
///
/// A deprecated path is only deleted when it exists on disk and neither it
/// nor anything below it is part of the render set.
pub fn compute_diff(
    contents: &RenderedFiles,
    disk: &BTreeMap<String, String>,
    root: &Path,
    deprecated: &[&str],
) -> RenderDiff {
    let mut diff = RenderDiff::default();

    for (path, content) in contents {
        match disk.get(path) {
            None => {
                diff.new.insert(path.clone());
            }
            Some(hash) if *hash != hash_bytes(content.as_bytes()) => {
                diff.updated.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in deprecated {
        let path = path.trim_end_matches('/');
        let rendered = contents.contains_key(path)
            || contents.keys().any(|k| is_below(k, path));
        if rendered {
            tracing::debug!(path, "deprecated path is rendered again, keeping it");
            continue;
        }
        if root.join(path).symlink_metadata().is_ok() {
            diff.deleted.insert(path.to_string());
        }
    }

    for path in disk.keys() {
        if contents.contains_key(path) {
            continue;
        }
        let being_deleted = diff
            .deleted
            .iter()
            .any(|d| d == path || is_below(path, d));
        if !being_deleted {
            diff.untracked.insert(path.clone());
        }
    }

    diff
}

fn is_below(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
}

/// Resolves `relative` under `root`, refusing anything that would leave it.
///
/// The nearest existing ancestor of the target is canonicalized as well, so
/// a symlinked directory inside the tree cannot redirect a write outside it.
pub fn ensure_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let escape = || NebariError::PathEscape {
        path: relative.to_string(),
        root: root.to_path_buf(),
    };

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(escape());
    }

    let target = root.join(&normalized);
    if !root.exists() {
        return Ok(target);
    }
    let canonical_root = root.canonicalize()?;

    let mut ancestor = target.parent();
    while let Some(dir) = ancestor {
        if dir.exists() {
            if !dir.canonicalize()?.starts_with(&canonical_root) {
                return Err(escape());
            }
            break;
        }
        ancestor = dir.parent();
    }

    if target.exists() && !target.canonicalize()?.starts_with(&canonical_root) {
        return Err(escape());
    }

    Ok(target)
}

/// Refuses to render directly into the user's home directory.
pub fn guard_output_directory(output_directory: &Path) -> Result<()> {
    let Some(home) = dirs::home_dir() else {
        return Ok(());
    };
    let (Ok(output), Ok(home)) = (output_directory.canonicalize(), home.canonicalize()) else {
        return Ok(());
    };
    if output == home {
        return Err(NebariError::HomeDirectory(home));
    }
    Ok(())
}

/// A computed render whose every target has already been resolved.
///
/// Building the plan never touches the disk, so callers can report the diff
/// before anything changes.
#[derive(Debug)]
pub struct RenderPlan {
    diff: RenderDiff,
    writes: Vec<(PathBuf, FileContent)>,
    deletes: Vec<(String, PathBuf)>,
}

impl RenderPlan {
    pub fn diff(&self) -> &RenderDiff {
        &self.diff
    }

    /// Writes new and updated files, then removes deprecated paths.
    pub fn apply(self) -> Result<RenderDiff> {
        for (target, content) in &self.writes {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target, content.as_bytes())?;
        }

        for (path, target) in &self.deletes {
            let metadata = target.symlink_metadata()?;
            if metadata.is_dir() {
                std::fs::remove_dir_all(target)?;
            } else {
                std::fs::remove_file(target)?;
            }
            tracing::info!(path = %path, "removed deprecated path");
        }

        Ok(self.diff)
    }
}

/// Diffs `contents` against `root` and resolves every write and delete target.
pub fn plan_files(contents: &RenderedFiles, root: &Path, deprecated: &[&str]) -> Result<RenderPlan> {
    let disk = hash_directory(root)?;
    let diff = compute_diff(contents, &disk, root, deprecated);

    let mut writes = Vec::with_capacity(diff.new.len() + diff.updated.len());
    for path in diff.new.iter().chain(diff.updated.iter()) {
        let target = ensure_within(root, path)?;
        if let Some(content) = contents.get(path) {
            writes.push((target, content.clone()));
        }
    }

    let mut deletes = Vec::with_capacity(diff.deleted.len());
    for path in &diff.deleted {
        deletes.push((path.clone(), ensure_within(root, path)?));
    }

    tracing::info!(
        new = diff.new.len(),
        updated = diff.updated.len(),
        deleted = diff.deleted.len(),
        untracked = diff.untracked.len(),
        "planned render of {}",
        root.display()
    );

    Ok(RenderPlan { diff, writes, deletes })
}

/// Diffs `contents` against `root` and applies the result unless `dry_run`.
pub fn render_files(
    contents: &RenderedFiles,
    root: &Path,
    deprecated: &[&str],
    dry_run: bool,
) -> Result<RenderDiff> {
    let plan = plan_files(contents, root, deprecated)?;
    if dry_run {
        return Ok(plan.diff);
    }
    plan.apply()
}

/// Plans the render of every stage into `output_directory`.
pub fn plan_stages(stages: &[Box<dyn Stage>], output_directory: &Path) -> Result<RenderPlan> {
    guard_output_directory(output_directory)?;
    let contents = collect_rendered(stages)?;
    plan_files(&contents, output_directory, DEPRECATED_FILE_PATHS)
}
