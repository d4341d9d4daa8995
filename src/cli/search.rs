//! Locating the image file.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{Error, Result};

/// Search path used when neither `--path` nor the environment supply one.
pub const DEFAULT_PATH: &str = ".";

/// Environment variable holding the default search path.
pub const PATH_VARIABLE: &str = "FORTHPATH";

/// Separator between search path entries.
#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
/// Separator between search path entries.
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

/// The search path: `explicit` if given, else `$FORTHPATH`, else [`DEFAULT_PATH`].
#[must_use]
pub fn search_path(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| env::var(PATH_VARIABLE).ok())
        .unwrap_or_else(|| DEFAULT_PATH.to_string())
}

/// Finds the image `name`.
///
/// A name containing a directory separator is used as given. Otherwise the directory of the
/// running executable is tried first, then each entry of `path` in order.
///
/// # Errors
///
/// Returns [`crate::Error::ImageNotFound`] if no candidate is a readable file.
pub fn locate(name: &str, path: &str) -> Result<PathBuf> {
    let not_found = || Error::ImageNotFound {
        name: name.to_string(),
        path: path.to_string(),
    };

    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        let candidate = PathBuf::from(name);
        return if is_image_candidate(&candidate) {
            Ok(candidate)
        } else {
            Err(not_found())
        };
    }

    let executable_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let directories = executable_dir
        .into_iter()
        .chain(path.split(PATH_SEPARATOR).map(|entry| {
            if entry.is_empty() {
                PathBuf::from(DEFAULT_PATH)
            } else {
                PathBuf::from(entry)
            }
        }));

    for directory in directories {
        let candidate = directory.join(name);
        log::debug!("trying image {}", candidate.display());
        if is_image_candidate(&candidate) {
            return Ok(candidate);
        }
    }

    Err(not_found())
}

fn is_image_candidate(path: &Path) -> bool {
    path.metadata().is_ok_and(|metadata| metadata.is_file())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("forthboot-search-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn walks_path_in_order() {
        let first = scratch("first");
        let second = scratch("second");
        fs::write(second.join("walk.fi"), b"image").unwrap();

        let path = format!(
            "{}{PATH_SEPARATOR}{}",
            first.display(),
            second.display()
        );
        assert_eq!(locate("walk.fi", &path).unwrap(), second.join("walk.fi"));

        fs::write(first.join("walk.fi"), b"image").unwrap();
        assert_eq!(locate("walk.fi", &path).unwrap(), first.join("walk.fi"));

        fs::remove_dir_all(first).unwrap();
        fs::remove_dir_all(second).unwrap();
    }

    #[test]
    fn explicit_location() {
        let dir = scratch("explicit");
        let image = dir.join("direct.fi");
        fs::write(&image, b"image").unwrap();

        let name = image.to_string_lossy().to_string();
        assert_eq!(locate(&name, "/nonexistent").unwrap(), image);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn not_found() {
        let dir = scratch("missing");
        let path = dir.to_string_lossy().to_string();

        match locate("absent.fi", &path) {
            Err(Error::ImageNotFound { name, path: searched }) => {
                assert_eq!(name, "absent.fi");
                assert_eq!(searched, path);
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(locate(&format!("{path}/absent.fi"), ".").is_err());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn directories_are_not_images() {
        let dir = scratch("nested");
        fs::create_dir_all(dir.join("sub.fi")).unwrap();
        assert!(locate("sub.fi", &dir.to_string_lossy()).is_err());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(search_path(Some("/opt/forth")), "/opt/forth");
    }
}
