use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PubtatorError {
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("norm value error: {kind} \"{text}\" in {document} ({start}-{end}): \"{norm}\"")]
    InvalidNorm {
        document: String,
        kind: String,
        text: String,
        start: usize,
        end: usize,
        norm: String,
    },

    #[error("failed to strip taxonomy ID from {0}")]
    InvalidTaxonomyId(String),

    #[error("{count} document(s) could not be read")]
    #[diagnostic(help("rerun with --allow-errors to keep the documents that did convert"))]
    InvalidDocuments { count: usize },

    #[error("title is not a prefix of the text in document {0}")]
    TitleMismatch(String),

    #[error("invalid random sampling ratio {0} (must be 0 <= ratio <= 1)")]
    InvalidRatio(f64),

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to parse {path}: {message}")]
    Json { path: String, message: String },

    #[error("duplicate id in {path}: {id}")]
    DuplicateAnnotationId { path: String, id: String },

    #[error("unsupported annotation: {0}")]
    UnsupportedAnnotation(String),

    #[error("non-JSON-LD not supported: {0}")]
    UnsupportedFile(String),

    #[error("failed to parse fragment: {0}")]
    InvalidFragment(String),

    #[error("cooccurrence across documents: {0} and {1}")]
    CrossDocument(String, String),

    #[error("expected 3 TAB-separated values, got {fields} on line {line} in {path}: {content}")]
    MappingFormat {
        path: String,
        line: usize,
        fields: usize,
        content: String,
    },

    #[error("relation {relation} refers to unknown annotation {target}")]
    DanglingRelation { relation: String, target: String },

    #[error("{0}")]
    Merge(String),

    #[error("{failed} of {count} file(s) failed")]
    FilesFailed { count: usize, failed: usize },
}
