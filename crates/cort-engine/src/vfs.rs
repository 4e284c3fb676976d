//! In-memory virtual filesystem
//!
//! Rendered artifacts and static sources are composed inside a [`VirtualFs`]
//! so that overlay composition never touches the real filesystem. Paths are
//! slash-separated, relative, and can never leave the root.

use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::TemplateSet;
use crate::error::VfsError;

type Result<T> = std::result::Result<T, VfsError>;

/// Normalize a relative path
///
/// `.` and empty segments are dropped and `..` pops the previous segment.
/// Absolute paths and paths escaping the root are rejected. The root itself
/// normalizes to `""`.
pub fn normalize_path(path: &str) -> Result<String> {
    if path.starts_with('/') || path.starts_with('\\') || has_drive_prefix(path) {
        return Err(VfsError::InvalidPath {
            path: path.to_string(),
            reason: "absolute paths are not allowed",
        });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(VfsError::InvalidPath {
                        path: path.to_string(),
                        reason: "path escapes the root",
                    });
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// `C:`, `C:/` or `C:\` prefix
fn has_drive_prefix(path: &str) -> bool {
    match path.as_bytes() {
        [drive, b':'] => drive.is_ascii_alphabetic(),
        [drive, b':', b'/' | b'\\', ..] => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Parent directory of a normalized path (`""` for top-level entries)
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(index) => &path[..index],
        None => "",
    }
}

/// In-memory file tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file, replacing any previous content
    pub fn write(&mut self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let normalized = normalize_path(path)?;
        if normalized.is_empty() {
            return Err(VfsError::InvalidPath {
                path: path.to_string(),
                reason: "cannot write to the root directory",
            });
        }
        self.files.insert(normalized, content.into());
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<&[u8]> {
        let normalized = normalize_path(path)?;
        self.files
            .get(&normalized)
            .map(Vec::as_slice)
            .ok_or(VfsError::NotFound { path: normalized })
    }

    pub fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| VfsError::NotUtf8 {
            path: path.to_string(),
        })
    }

    /// A file or directory exists at `path`
    pub fn exists(&self, path: &str) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    pub fn is_file(&self, path: &str) -> bool {
        normalize_path(path).is_ok_and(|p| self.files.contains_key(&p))
    }

    /// Directories exist implicitly while they contain files; the root always exists
    pub fn is_dir(&self, path: &str) -> bool {
        match normalize_path(path) {
            Ok(p) if p.is_empty() => true,
            Ok(p) => {
                let prefix = format!("{}/", p);
                self.files
                    .range(prefix.clone()..)
                    .next()
                    .is_some_and(|(k, _)| k.starts_with(&prefix))
            }
            Err(_) => false,
        }
    }

    /// Names of the immediate children of a directory, sorted
    pub fn list_dir(&self, path: &str) -> Result<Vec<String>> {
        let normalized = normalize_path(path)?;
        if !self.is_dir(&normalized) {
            return Err(VfsError::NotFound { path: normalized });
        }

        let prefix = if normalized.is_empty() {
            String::new()
        } else {
            format!("{}/", normalized)
        };

        let mut children: Vec<String> = self
            .files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }

    /// Resolve `relative` against the directory `base`, staying inside the root
    pub fn join(base: &str, relative: &str) -> Result<String> {
        if relative.starts_with('/') {
            return Err(VfsError::InvalidPath {
                path: relative.to_string(),
                reason: "absolute paths are not allowed",
            });
        }
        if base.is_empty() {
            normalize_path(relative)
        } else {
            normalize_path(&format!("{}/{}", base, relative))
        }
    }

    /// All files in path order
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Sources loaded from a directory: templates plus verbatim static files
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub templates: TemplateSet,
    pub statics: VirtualFs,
}

/// Load a source directory
///
/// Files whose name ends with `template_suffix` become templates named by
/// their relative path with the suffix stripped; all other files are copied
/// verbatim. An empty suffix makes every file a template.
pub fn load_dir(root: &Path, template_suffix: &str) -> std::result::Result<SourceTree, VfsError> {
    let mut tree = SourceTree::default();

    let mut entries: Vec<walkdir::DirEntry> = walkdir::WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .collect::<std::result::Result<_, _>>()?;
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let content = std::fs::read(entry.path()).map_err(|source| VfsError::Read {
            path: entry.path().display().to_string(),
            source,
        })?;

        let template_name = if template_suffix.is_empty() {
            Some(name.as_str())
        } else {
            name.strip_suffix(template_suffix)
                .filter(|stripped| !stripped.is_empty() && !stripped.ends_with('/'))
        };

        match template_name {
            Some(template_name) => {
                let source = String::from_utf8(content).map_err(|_| VfsError::NotUtf8 {
                    path: name.clone(),
                })?;
                tree.templates.add(template_name, source);
            }
            None => tree.statics.write(&name, content)?,
        }
    }

    tracing::debug!(
        root = %root.display(),
        templates = tree.templates.len(),
        statics = tree.statics.len(),
        "loaded source directory"
    );

    Ok(tree)
}
