//! Working-copy helpers for code changes
//!
//! - Size-bounded source snapshot sent to coding agents as context
//! - Path guard for agent-proposed writes

use shipwright_core::PipelineError;
use shipwright_parse::{render_file_edits, FileEdit};
use std::path::{Component, Path, PathBuf};

/// Directories never included in a snapshot
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".azure",
    ".next",
    ".venv",
    "__pycache__",
    "bin",
    "build",
    "coverage",
    "dist",
    "node_modules",
    "obj",
    "out",
    "target",
    "vendor",
    "venv",
];

/// Extensions treated as binary or generated
const SKIP_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "webp", "bmp", "svgz", "pdf", "zip", "gz", "tgz", "tar",
    "woff", "woff2", "ttf", "otf", "eot", "mp3", "mp4", "webm", "mov", "wasm", "so", "dll", "exe",
    "class", "jar", "pyc", "lock", "map",
];

/// Source files handed to a coding agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub files: Vec<FileEdit>,
    pub bytes: usize,
    /// Some eligible files did not fit
    pub truncated: bool,
}

impl Snapshot {
    /// Files in the same `FILE:` grammar the agent is asked to answer in
    #[must_use]
    pub fn render(&self) -> String {
        if self.files.is_empty() {
            return "(the repository has no readable source files yet)\n".to_string();
        }
        render_file_edits(&self.files)
    }
}

/// Collect up to `limit` bytes of source text under `root`
///
/// `candidates` are repository-relative paths (e.g. tracked files); when
/// empty, the tree under `root` is walked instead. Paths are visited in
/// sorted order and files that do not fit are skipped. The walk runs on the
/// blocking pool.
///
/// # Errors
/// I/O failure while walking `root`.
pub async fn snapshot(root: &Path, candidates: &[String], limit: usize) -> std::io::Result<Snapshot> {
    let root = root.to_path_buf();
    let candidates = candidates.to_vec();
    tokio::task::spawn_blocking(move || collect_snapshot(&root, candidates, limit))
        .await
        .map_err(|e| std::io::Error::other(format!("snapshot task failed: {e}")))?
}

fn collect_snapshot(root: &Path, candidates: Vec<String>, limit: usize) -> std::io::Result<Snapshot> {
    let mut paths: Vec<String> = if candidates.is_empty() {
        let mut found = Vec::new();
        walk(root, root, &mut found)?;
        found
    } else {
        candidates
    };
    paths.retain(|p| eligible(p));
    paths.sort();
    paths.dedup();

    let mut snap = Snapshot::default();
    for path in paths {
        let Ok(bytes) = std::fs::read(root.join(&path)) else {
            continue;
        };
        if bytes.contains(&0) {
            continue;
        }
        let Ok(content) = String::from_utf8(bytes) else {
            continue;
        };
        if snap.bytes + content.len() > limit {
            snap.truncated = true;
            continue;
        }
        snap.bytes += content.len();
        snap.files.push(FileEdit::new(path, content));
    }
    tracing::debug!(files = snap.files.len(), bytes = snap.bytes, truncated = snap.truncated, "source snapshot");
    Ok(snap)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let name = entry.file_name();
            if !SKIP_DIRS.iter().any(|d| name == *d) {
                walk(root, &path, out)?;
            }
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

fn eligible(path: &str) -> bool {
    let mut segments: Vec<&str> = path.split('/').collect();
    let Some(file) = segments.pop() else {
        return false;
    };
    if segments.iter().any(|s| SKIP_DIRS.contains(s)) {
        return false;
    }
    let ext = file.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    !matches!(ext, Some(e) if SKIP_EXTENSIONS.contains(&e.as_str())) && !file.ends_with(".min.js")
}

/// Resolve an agent-proposed path inside `root`
///
/// The path is normalized lexically; anything absolute, anything whose
/// `..` segments climb above `root`, and anything inside `.git` is rejected.
/// The deepest part of the result that already exists on disk is then
/// resolved through symlinks and must still lie under the real `root`.
///
/// # Errors
/// [`PipelineError::PathSafetyViolation`] naming the offending path.
pub fn resolve_within(root: &Path, proposed: &str) -> Result<PathBuf, PipelineError> {
    let violation = || PipelineError::PathSafetyViolation {
        path: proposed.to_string(),
        root: root.to_path_buf(),
    };

    let normalized = proposed.replace('\\', "/");
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop().ok_or_else(violation)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(violation()),
        }
    }
    if parts.is_empty() || parts[0] == ".git" {
        return Err(violation());
    }
    let resolved = parts.iter().fold(root.to_path_buf(), |acc, p| acc.join(p));
    if !stays_inside(root, &resolved) {
        return Err(violation());
    }
    Ok(resolved)
}

/// Whether the deepest existing ancestor of `path` really lives under `root`
fn stays_inside(root: &Path, path: &Path) -> bool {
    let Ok(real_root) = root.canonicalize() else {
        // No working copy on disk yet, so no links to follow
        return true;
    };
    let mut current = path;
    loop {
        if current.symlink_metadata().is_ok() {
            // Dangling links fail to canonicalize and are rejected
            return current
                .canonicalize()
                .is_ok_and(|real| real.starts_with(&real_root));
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}
