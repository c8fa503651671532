// ABOUTME: Local filesystem layer for exported pages and imported assets
// ABOUTME: Handles atomic writes, asset directory scans and safe file naming

use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    use rand::Rng;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    // Temp file next to the target so the rename stays on one filesystem
    let random: u32 = rand::thread_rng().gen();
    let tmp_path = parent.join(format!(".{:x}.part", random));

    fs::write(&tmp_path, content)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Regular files directly inside `dir`, sorted by name.
///
/// A missing directory yields an empty list. Sub-directories are skipped.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Reduces a remote-supplied name to a single path component.
pub fn local_file_name(name: &str) -> String {
    let last = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .find(|part| !part.is_empty())
        .unwrap_or_default();

    match last {
        "" | "." | ".." => "untitled".to_string(),
        other => other.to_string(),
    }
}

/// File stem for a page title. Path separators become `_` so no part of
/// the title is lost.
pub fn page_file_stem(title: &str) -> String {
    let stem = title.trim().replace(['/', '\\'], "_");
    if matches!(stem.as_str(), "" | "." | "..") {
        "untitled".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested").join("test.txt");
        write_atomic(&target, b"hello").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("page.md");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("page.md")]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    fn test_list_files_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(list_files(&temp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_list_files_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.png"), b"b").unwrap();
        fs::write(temp.path().join("a.png"), b"a").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let files = list_files(temp.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.png"));
        assert!(files[1].ends_with("b.png"));
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("img/pic.PNG")), "image/png");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("/test/testmd2"), "testmd2");
        assert_eq!(local_file_name("Release Notes"), "Release Notes");
        assert_eq!(local_file_name("../../etc/passwd"), "passwd");
        assert_eq!(local_file_name("dir\\pic.png"), "pic.png");
        assert_eq!(local_file_name("/"), "untitled");
        assert_eq!(local_file_name(".."), "untitled");
    }

    #[test]
    fn test_page_file_stem() {
        assert_eq!(page_file_stem("Q1/Q2 report"), "Q1_Q2 report");
        assert_eq!(page_file_stem("a\\b"), "a_b");
        assert_eq!(page_file_stem("  Guide "), "Guide");
        assert_eq!(page_file_stem(".."), "untitled");
        assert_eq!(page_file_stem(""), "untitled");
    }
}
