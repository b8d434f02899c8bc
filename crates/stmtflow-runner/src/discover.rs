//! Expanding command-line paths into spec and script files

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::DriverError;

/// Extensions of structured spec files
pub const SPEC_EXTENSIONS: &[&str] = &["json", "jinja", "j2"];

/// Extensions of annotated SQL scripts
pub const SCRIPT_EXTENSIONS: &[&str] = &["sql"];

/// Expand `paths` into files, in argument order
///
/// Files are taken as given. Directories are walked recursively and only
/// files with one of `extensions` are kept, sorted by path.
pub fn collect_files(paths: &[PathBuf], extensions: &[&str]) -> Result<Vec<PathBuf>, DriverError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
                found.push(entry.into_path());
            }
        }
        tracing::debug!(dir = %path.display(), files = found.len(), "walked directory");
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "[]").unwrap();
    }

    #[test]
    fn test_walks_directories_in_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.json");
        touch(dir.path(), "a.jinja");
        touch(dir.path(), "nested/c.j2");
        touch(dir.path(), "notes.md");
        touch(dir.path(), "lost_update.sql");

        let files = collect_files(&[dir.path().to_path_buf()], SPEC_EXTENSIONS).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.jinja", "b.json", "nested/c.j2"]);

        let scripts = collect_files(&[dir.path().to_path_buf()], SCRIPT_EXTENSIONS).unwrap();
        assert_eq!(scripts.len(), 1);
    }

    #[test]
    fn test_files_are_taken_as_given() {
        let paths = vec![PathBuf::from("missing.txt"), PathBuf::from("z.json")];
        assert_eq!(collect_files(&paths, SPEC_EXTENSIONS).unwrap(), paths);
    }
}
