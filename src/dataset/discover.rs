//! Image file discovery.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Discover image files in a directory (one level, no recursion).
///
/// An absent directory degrades to an empty result with a logged warning
/// rather than an error: dataset directories are optional at startup. The
/// result is sorted so downstream splits see a stable input ordering.
pub fn discover_images(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!("Image directory not found at: {}", dir.display());
        return Vec::new();
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read image directory {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();

    images.sort();

    info!("Found {} images in {}", images.len(), dir.display());
    images
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg" | "png")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_empty_not_error() {
        let images = discover_images(Path::new("/nonexistent/images"));
        assert!(images.is_empty());
    }

    #[test]
    fn test_matches_case_variant_extensions() {
        let dir = TempDir::new().unwrap();
        for name in ["a.jpg", "b.JPEG", "c.PNG", "d.txt", "e.jpg.bak"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let images = discover_images(dir.path());
        assert_eq!(images.len(), 3);
    }

    #[test]
    fn test_no_recursion_into_subdirectories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("top.jpg"), b"x").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("nested.jpg"), b"x").unwrap();

        let images = discover_images(dir.path());
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with("top.jpg"));
    }

    #[test]
    fn test_result_is_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["c.jpg", "a.jpg", "b.jpg"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let images = discover_images(dir.path());
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }
}
