use std::collections::HashMap;
use std::env;
use std::path::{Component, Path, PathBuf};

/// Absolute form of `path` with `.` and `..` folded away. Does not touch the
/// filesystem, so the file need not exist.
pub fn resolve(path: &str) -> PathBuf {
    let raw = Path::new(path);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(raw),
            Err(_) => raw.to_path_buf(),
        }
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Map key for a source path: resolved and lower-cased.
pub fn canonical_key(path: &str) -> String {
    resolve(path).to_string_lossy().to_lowercase()
}

fn basename(path: &str) -> &str {
    path.rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(path)
}

/// Translates file names between the local workspace and the server's
/// filesystem. Only the basename survives the trip, so same-named files in
/// different directories map to the same place.
#[derive(Debug, Default, Clone)]
pub struct PathMapper {
    server_base: String,
    local_base: Option<PathBuf>,
}

impl PathMapper {
    pub fn new(server_base: impl Into<String>) -> Self {
        Self {
            server_base: server_base.into(),
            local_base: None,
        }
    }

    pub fn server_base(&self) -> &str {
        &self.server_base
    }

    pub fn is_identity(&self) -> bool {
        self.server_base.is_empty()
    }

    fn capture_local_base(&mut self, path: &str) {
        if self.local_base.is_some() {
            return;
        }
        let resolved = resolve(path);
        self.local_base = Some(
            resolved
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        );
    }

    /// Local path to the name the server knows it by.
    pub fn to_server(&mut self, path: &str) -> String {
        if self.is_identity() {
            return path.to_string();
        }
        self.capture_local_base(path);
        let joined = Path::new(&self.server_base).join(basename(path));
        joined.to_string_lossy().replace('\\', "/")
    }

    /// Server path to the local file it stands for.
    pub fn to_local(&mut self, path: &str) -> String {
        if path.is_empty() {
            return String::new();
        }
        if self.is_identity() {
            return path.to_string();
        }
        let path = path.replace('\\', "/");
        self.capture_local_base(&path);
        let base = self.local_base.clone().unwrap_or_default();
        base.join(basename(&path)).to_string_lossy().into_owned()
    }
}

/// Remembers the original casing of paths that are stored under lower-cased
/// keys.
#[derive(Debug, Default, Clone)]
pub struct Filenames {
    actual: HashMap<String, String>,
}

impl Filenames {
    pub fn remember(&mut self, path: &str) {
        let resolved = resolve(path).to_string_lossy().into_owned();
        let key = resolved.to_lowercase();
        if key != resolved {
            self.actual.insert(key, resolved);
        }
    }

    /// Original-cased path for `path`, or `path` itself if never seen.
    pub fn actual(&self, path: &str) -> String {
        self.actual
            .get(&canonical_key(path))
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_folds_parent_dirs() {
        assert_eq!(resolve("/a/b/../c/./d.cscs"), PathBuf::from("/a/c/d.cscs"));
    }

    #[test]
    fn server_mapping_keeps_basename() {
        let mut mapper = PathMapper::new("/srv/scripts");
        assert_eq!(mapper.to_server("/home/me/work/test.cscs"), "/srv/scripts/test.cscs");
        assert_eq!(mapper.to_local("/srv/scripts/other.cscs"), "/home/me/work/other.cscs");
    }

    #[test]
    fn empty_base_is_identity() {
        let mut mapper = PathMapper::new("");
        assert_eq!(mapper.to_server("rel/x.cscs"), "rel/x.cscs");
        assert_eq!(mapper.to_local(""), "");
    }

    #[test]
    fn filenames_restore_case() {
        let mut names = Filenames::default();
        names.remember("/Work/Test.cscs");
        assert_eq!(names.actual("/work/test.cscs"), "/Work/Test.cscs");
        assert_eq!(names.actual("/other.cscs"), "/other.cscs");
    }
}
