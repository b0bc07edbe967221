use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::PubtatorError;

/// Open a text input, decompressing `.gz` files transparently.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>, PubtatorError> {
    let file = fs::File::open(path)
        .map_err(|err| PubtatorError::Filesystem(format!("open {}: {err}", path.display())))?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a list of ids, one per line.
pub fn read_id_list(path: &Path) -> Result<HashSet<String>, PubtatorError> {
    let content = fs::read_to_string(path)
        .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect())
}

pub fn read_json(path: &Path) -> Result<serde_json::Value, PubtatorError> {
    let content = fs::read_to_string(path)
        .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", path.display())))?;
    serde_json::from_str(&content).map_err(|err| PubtatorError::Json {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Replace the content of `path` through a temporary sibling file.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), PubtatorError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".pubtator")
        .tempfile_in(parent)
        .map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| PubtatorError::Filesystem(format!("write {}: {err}", path.display())))?;
    Ok(())
}

/// Which files to pick up when walking the arguments of a post-processing tool.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub recurse: bool,
    /// Files found while recursing must end with this suffix; explicit file
    /// arguments are always taken.
    pub suffix: String,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            recurse: false,
            suffix: ".jsonld".to_string(),
        }
    }
}

/// Expand file and directory arguments into the list of files to process.
///
/// Directory entries are visited in name order so repeated runs see files
/// in the same order.
pub fn collect_files(paths: &[PathBuf], options: &WalkOptions) -> Result<Vec<PathBuf>, PubtatorError> {
    let mut files = Vec::new();
    for path in paths {
        visit(path, options, false, &mut files)?;
    }
    Ok(files)
}

fn visit(
    path: &Path,
    options: &WalkOptions,
    recursed: bool,
    files: &mut Vec<PathBuf>,
) -> Result<(), PubtatorError> {
    if path.is_file() {
        let name = path.file_name().map(|name| name.to_string_lossy());
        if !recursed || name.is_some_and(|name| name.ends_with(options.suffix.as_str())) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        if !options.recurse {
            tracing::info!("skipping directory {}", path.display());
            return Ok(());
        }
        for entry in sorted_entries(path)? {
            visit(&entry, options, true, files)?;
        }
    } else if !recursed {
        return Err(PubtatorError::Filesystem(format!(
            "no such file or directory: {}",
            path.display()
        )));
    }
    Ok(())
}

pub fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PubtatorError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", dir.display())))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
    entries.sort();
    Ok(entries)
}
