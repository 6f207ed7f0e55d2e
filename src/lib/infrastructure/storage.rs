//! Filesystem storage for attachment files

use std::path::{Component, Path, PathBuf};

use crate::domain::attachments::AttachmentError;

mod static_library;
mod uploads;

pub use static_library::FilesystemStaticLibrary;
pub use uploads::FilesystemUploadStore;

/// Join `reference` to `root`, refusing anything that could leave the root
fn contained_path(root: &Path, reference: &str) -> Result<PathBuf, AttachmentError> {
    let relative = Path::new(reference);

    let is_plain = !reference.trim().is_empty()
        && relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if !is_plain {
        return Err(AttachmentError::InvalidPath(reference.to_string()));
    }

    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contained_path() {
        let root = Path::new("/srv/attachments");

        assert_eq!(
            contained_path(root, "legal/terms.txt").ok(),
            Some(PathBuf::from("/srv/attachments/legal/terms.txt"))
        );

        for reference in ["", "/etc/passwd", "../secrets.txt", "legal/../../x", "./a"] {
            assert!(
                matches!(
                    contained_path(root, reference),
                    Err(AttachmentError::InvalidPath(_))
                ),
                "{reference} should be rejected"
            );
        }
    }
}
