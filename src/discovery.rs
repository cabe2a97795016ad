//! Input discovery and output path resolution for the command-line shell.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tracing::warn;

use crate::error::{ImportError, ImportResult};

/// Store filename used when the output is omitted or names a directory.
pub const DEFAULT_DB_FILENAME: &str = "patrimonios.db";

/// Extensions scanned by [`discover_input`], in priority order.
const CANDIDATE_EXTENSIONS: [&str; 2] = ["csv", "xlsx"];

/// All `.csv` files in `dir`, then all `.xlsx` files, each group in path order.
pub fn candidate_inputs(dir: &Path) -> ImportResult<Vec<PathBuf>> {
    let base = Pattern::escape(&dir.to_string_lossy());
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::new()
    };

    let mut found = Vec::new();
    for ext in CANDIDATE_EXTENSIONS {
        let pattern = format!("{base}/*.{ext}");
        let paths = glob::glob_with(&pattern, options).map_err(|e| {
            ImportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))
        })?;
        for entry in paths {
            let path = entry.map_err(|e| ImportError::Io(e.into()))?;
            if path.is_file() {
                found.push(path);
            }
        }
    }
    Ok(found)
}

/// Pick the input when none was given: the first candidate in `dir`.
///
/// Warns when more than one candidate exists.
pub fn discover_input(dir: &Path) -> ImportResult<PathBuf> {
    let mut candidates = candidate_inputs(dir)?.into_iter();
    let first = candidates.next().ok_or_else(|| ImportError::NoInputFound {
        dir: dir.to_path_buf(),
    })?;
    let others = candidates.count();
    if others > 0 {
        warn!(path = %first.display(), others, "more than one input file found; using the first");
    }
    Ok(first)
}

/// Output store path: `base_dir/patrimonios.db` when omitted, `<dir>/patrimonios.db` when the
/// given path is a directory, otherwise the path as given.
pub fn resolve_output_path(output: Option<&Path>, base_dir: &Path) -> PathBuf {
    match output {
        None => base_dir.join(DEFAULT_DB_FILENAME),
        Some(p) if p.is_dir() => p.join(DEFAULT_DB_FILENAME),
        Some(p) => p.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{DEFAULT_DB_FILENAME, discover_input, resolve_output_path};
    use crate::error::ImportError;

    fn tmp_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("tabload-discovery-{name}-{nanos}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn csv_wins_over_xlsx_and_first_path_is_used() {
        let dir = tmp_dir("pick");
        fs::write(dir.join("b.csv"), "id\n1\n").unwrap();
        fs::write(dir.join("a.xlsx"), b"not really a workbook").unwrap();
        fs::write(dir.join("a.csv"), "id\n1\n").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        assert_eq!(discover_input(&dir).unwrap(), dir.join("a.csv"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_directory_reports_no_input() {
        let dir = tmp_dir("empty");
        let err = discover_input(&dir).unwrap_err();
        assert!(matches!(err, ImportError::NoInputFound { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn output_path_defaults_and_directories_get_the_default_filename() {
        let dir = tmp_dir("out");
        assert_eq!(resolve_output_path(None, &dir), dir.join(DEFAULT_DB_FILENAME));
        assert_eq!(resolve_output_path(Some(&dir), Path::new("/unused")), dir.join(DEFAULT_DB_FILENAME));
        let file = dir.join("custom.db");
        assert_eq!(resolve_output_path(Some(&file), &dir), file);
        let _ = fs::remove_dir_all(&dir);
    }
}
