use std::path::Path;

/// Directories never watched in either mode.
pub const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    ".venv",
    "venv",
    ".pytest_cache",
    ".mypy_cache",
    "coverage",
    ".serverless",
];

const TEST_FILE_SUFFIXES: &[&str] = &[".test.js", ".spec.js", "_test.py", ".test.py"];

/// Include/exclude predicate for file-change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRules {
    /// Only files with these extensions qualify; empty means any file.
    pub extensions: Vec<String>,
}

impl WatchRules {
    /// Whole build context.
    pub fn any_file() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Source-language files only.
    pub fn source_files(extension: &str) -> Self {
        Self {
            extensions: vec![extension.trim_start_matches('.').to_owned()],
        }
    }

    /// Whether a change to `path` (relative to `root`) should trigger a rebuild.
    pub fn accepts(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let excluded_dir = relative.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
        });
        if excluded_dir {
            return false;
        }

        let Some(file_name) = relative.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        if TEST_FILE_SUFFIXES
            .iter()
            .any(|suffix| file_name.ends_with(suffix))
        {
            return false;
        }

        if self.extensions.is_empty() {
            return true;
        }
        relative
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| self.extensions.iter().any(|allowed| allowed == extension))
    }
}
