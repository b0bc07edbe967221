use std::collections::{BTreeSet, HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::PubtatorError;
use crate::fs_util::write_atomic;
use crate::webannotation::{WebAnnotation, annotations_json, read_annotations};

static ID_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*?)(\d*)$").unwrap());

const MAX_LISTED_SKIPS: usize = 10;

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Write merged files under this directory instead of stdout.
    pub output: Option<PathBuf>,
    pub recurse: bool,
    pub suffix: String,
    /// Merge files missing from some directories instead of skipping them.
    pub union: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            output: None,
            recurse: false,
            suffix: ".jsonld".to_string(),
            union: false,
        }
    }
}

/// Split an id into its shortest prefix and trailing number (0 if none).
pub fn split_id(id: &str) -> (&str, u64) {
    match ID_NUMBER_RE.captures(id) {
        Some(caps) => {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            let number = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            (prefix, number)
        }
        None => (id, 0),
    }
}

/// Rename annotations whose id already occurs in an earlier position, minting
/// prefix + (largest number with that prefix + 1). Relations in the same set
/// follow the renaming.
pub fn resolve_duplicate_ids(sets: &mut [Vec<WebAnnotation>]) {
    let mut seen = HashSet::new();
    let mut duplicates = HashSet::new();
    for (set_index, annotations) in sets.iter().enumerate() {
        for (index, annotation) in annotations.iter().enumerate() {
            if !seen.insert(annotation.id().to_string()) {
                duplicates.insert((set_index, index));
            }
        }
    }
    if duplicates.is_empty() {
        return;
    }

    let mut max_by_prefix: HashMap<String, u64> = HashMap::new();
    for annotation in sets.iter().flatten() {
        let (prefix, number) = split_id(annotation.id());
        let max = max_by_prefix.entry(prefix.to_string()).or_default();
        *max = (*max).max(number);
    }

    for (set_index, annotations) in sets.iter_mut().enumerate() {
        let mut id_map = HashMap::new();
        for (index, annotation) in annotations.iter().enumerate() {
            if !duplicates.contains(&(set_index, index)) {
                continue;
            }
            let (prefix, _) = split_id(annotation.id());
            let max = max_by_prefix.entry(prefix.to_string()).or_default();
            *max += 1;
            id_map.insert(annotation.id().to_string(), format!("{prefix}{max}"));
        }
        tracing::debug!("remapping {} ids in set {set_index}", id_map.len());
        for annotation in annotations.iter_mut() {
            annotation.remap_ids(&id_map);
        }
    }
}

/// Merges parallel annotation files or directory trees, writing either to an
/// output directory or to `out`.
pub struct Merger<W: Write> {
    options: MergeOptions,
    out: W,
    merged: usize,
}

impl<W: Write> Merger<W> {
    pub fn new(options: MergeOptions, out: W) -> Self {
        Self {
            options,
            out,
            merged: 0,
        }
    }

    /// Number of merged files written so far.
    pub fn merged(&self) -> usize {
        self.merged
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn merge(&mut self, paths: &[PathBuf]) -> Result<(), PubtatorError> {
        if paths.len() < 2 {
            return Err(PubtatorError::Merge(
                "need at least two files or directories to merge".to_string(),
            ));
        }
        self.merge_paths(paths, Path::new(""), false)
    }

    fn merge_paths(
        &mut self,
        paths: &[PathBuf],
        relative: &Path,
        recursed: bool,
    ) -> Result<(), PubtatorError> {
        let files = paths.iter().filter(|p| p.is_file()).cloned().collect::<Vec<_>>();
        let dirs = paths.iter().filter(|p| p.is_dir()).cloned().collect::<Vec<_>>();
        let missing = paths
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();
        let other = paths
            .iter()
            .filter(|p| p.exists() && !p.is_file() && !p.is_dir())
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();

        if !missing.is_empty() && !(recursed && self.options.union) {
            return Err(PubtatorError::Filesystem(format!(
                "no such file or directory: {}",
                missing.join(" ")
            )));
        }
        if !other.is_empty() {
            return Err(PubtatorError::Merge(format!(
                "neither file or directory: {}",
                other.join(" ")
            )));
        }
        if !files.is_empty() && !dirs.is_empty() {
            return Err(PubtatorError::Merge(format!(
                "mix of files ({}) and directories ({})",
                display_all(&files),
                display_all(&dirs)
            )));
        }

        if !files.is_empty() {
            return self.merge_files(&files, relative);
        }
        if recursed && !self.options.recurse {
            tracing::warn!("not recursing into {} (consider --recurse)", display_all(&dirs));
            return Ok(());
        }
        let relative = match (recursed, dirs.first().and_then(|dir| dir.file_name())) {
            (true, Some(name)) => relative.join(name),
            _ => relative.to_path_buf(),
        };
        self.merge_directories(&dirs, &relative)
    }

    fn merge_files(&mut self, files: &[PathBuf], relative: &Path) -> Result<(), PubtatorError> {
        let mut sets = Vec::with_capacity(files.len());
        for file in files {
            let annotations = read_annotations(file).inspect_err(|err| {
                tracing::error!("failed to parse {}: {err}", file.display());
            })?;
            sets.push(annotations);
        }
        resolve_duplicate_ids(&mut sets);
        let merged = sets.into_iter().flatten().collect::<Vec<_>>();
        let name = files
            .first()
            .and_then(|file| file.file_name())
            .map(OsString::from)
            .unwrap_or_default();
        self.output(&merged, relative, &name)
    }

    fn candidates(&self, dir: &Path) -> Result<BTreeSet<OsString>, PubtatorError> {
        let entries = fs::read_dir(dir)
            .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", dir.display())))?;
        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                if self.options.recurse {
                    names.insert(entry.file_name());
                } else {
                    tracing::info!("skipping dir {} (consider --recurse)", path.display());
                }
            } else if path.is_file() {
                if entry.file_name().to_string_lossy().ends_with(&self.options.suffix) {
                    names.insert(entry.file_name());
                } else {
                    tracing::debug!("skipping file {} (--suffix parameter)", path.display());
                }
            }
        }
        Ok(names)
    }

    fn merge_directories(&mut self, dirs: &[PathBuf], relative: &Path) -> Result<(), PubtatorError> {
        let listings = dirs
            .iter()
            .map(|dir| self.candidates(dir))
            .collect::<Result<Vec<_>, _>>()?;
        let union = listings.iter().flatten().cloned().collect::<BTreeSet<_>>();
        let intersection = union
            .iter()
            .filter(|name| listings.iter().all(|listing| listing.contains(*name)))
            .cloned()
            .collect::<BTreeSet<_>>();

        let names = if union.len() == intersection.len() || self.options.union {
            union
        } else {
            let skipped = union
                .difference(&intersection)
                .map(|name| name.to_string_lossy().into_owned())
                .collect::<Vec<_>>();
            let mut listed = skipped
                .iter()
                .take(MAX_LISTED_SKIPS)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
            if skipped.len() > MAX_LISTED_SKIPS {
                listed.push_str(" ...");
            }
            tracing::warn!(
                "skipping {} non-overlapping files (consider --union): {listed}",
                skipped.len()
            );
            intersection
        };

        tracing::info!("processing {} files in {}", names.len(), display_all(dirs));
        for name in &names {
            let paths = dirs.iter().map(|dir| dir.join(name)).collect::<Vec<_>>();
            self.merge_paths(&paths, relative, true)?;
        }
        Ok(())
    }

    fn output(
        &mut self,
        annotations: &[WebAnnotation],
        relative: &Path,
        name: &OsString,
    ) -> Result<(), PubtatorError> {
        let content = annotations_json(annotations)?;
        match &self.options.output {
            Some(base) => {
                let dir = base.join(relative);
                fs::create_dir_all(&dir).map_err(|err| {
                    PubtatorError::Filesystem(format!("create {}: {err}", dir.display()))
                })?;
                write_atomic(&dir.join(name), content.as_bytes())?;
            }
            None => {
                writeln!(self.out, "{content}")
                    .map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
            }
        }
        self.merged += 1;
        Ok(())
    }
}

fn display_all(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::webannotation::parse_annotations;

    #[test]
    fn splits_trailing_numbers() {
        assert_eq!(split_id("PMID:1/ann/12"), ("PMID:1/ann/", 12));
        assert_eq!(split_id("PMID:1/ann/x"), ("PMID:1/ann/x", 0));
        assert_eq!(split_id(""), ("", 0));
    }

    #[test]
    fn duplicates_are_renumbered_with_their_relations() {
        let first = parse_annotations(
            r#"[{"type":"Span","id":"d/ann/0","target":"d#char=0,1","body":{},"text":"a"},
                {"type":"Span","id":"d/ann/1","target":"d#char=2,3","body":{},"text":"b"}]"#,
            "first",
        )
        .unwrap();
        let second = parse_annotations(
            r#"[{"type":"Span","id":"d/ann/0","target":"d#char=4,5","body":{},"text":"c"},
                {"type":"Relation","id":"d/ann/1","target":"d","body":{"type":"Cooccurrence","from":"d/ann/0","to":"d/ann/0"}}]"#,
            "second",
        )
        .unwrap();
        let mut sets = vec![first, second];
        resolve_duplicate_ids(&mut sets);
        let ids = sets.iter().flatten().map(|a| a.id().to_string()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["d/ann/0", "d/ann/1", "d/ann/2", "d/ann/3"]);
        match &sets[1][1] {
            WebAnnotation::Relation(relation) => {
                assert_eq!(relation.body.from, "d/ann/2");
                assert_eq!(relation.body.to, "d/ann/2");
            }
            WebAnnotation::Span(_) => panic!("expected relation"),
        }
    }

    #[test]
    fn needs_two_paths() {
        let mut merger = Merger::new(MergeOptions::default(), Vec::new());
        assert_matches!(
            merger.merge(&[PathBuf::from("a.jsonld")]),
            Err(PubtatorError::Merge(_))
        );
    }
}
