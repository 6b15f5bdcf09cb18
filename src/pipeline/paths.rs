use std::path::{Path, PathBuf};

use serde::Serialize;

/// Resolve a folder against the run root.
///
/// A path that already starts with the root is returned unchanged, so
/// resolving twice never double-prefixes. Absolute paths outside the root are
/// kept as they are.
pub fn resolve_folder(root: &Path, folder: impl AsRef<Path>) -> PathBuf {
    let folder = folder.as_ref();
    if folder.starts_with(root) {
        folder.to_path_buf()
    } else {
        root.join(folder)
    }
}

/// Resolved folders handed to one stage invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageFolders {
    /// Carried-over input (absent for the generation stages)
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    /// Ground truth for the accuracy stage
    pub reference: Option<PathBuf>,
    /// Cell-parameter file rendered by `generate_cells`
    pub params_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefixes_relative_folder() {
        let resolved = resolve_folder(Path::new("run/"), "convolved");
        assert_eq!(resolved, Path::new("run/convolved/"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let root = Path::new("run/");
        let once = resolve_folder(root, "convolved");
        let twice = resolve_folder(root, &once);
        assert_eq!(once, twice);
        assert_eq!(
            resolve_folder(root, "run/convolved/"),
            Path::new("run/convolved/")
        );
    }

    #[test]
    fn test_resolve_checks_whole_components() {
        let resolved = resolve_folder(Path::new("run"), "running/convolved");
        assert_eq!(resolved, Path::new("run/running/convolved"));
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let resolved = resolve_folder(Path::new("run"), "/data/psf");
        assert_eq!(resolved, Path::new("/data/psf"));
    }
}
