use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PubtatorError;
use crate::fs_util::write_atomic;
use crate::output::to_pretty_json;

static FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^char=(\d+),(\d+)$").unwrap());

/// Web Annotation read back from converted JSON-LD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebAnnotation {
    Span(SpanAnnotation),
    Relation(RelationAnnotation),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanAnnotation {
    pub id: String,
    pub target: String,
    pub body: Map<String, Value>,
    pub text: String,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationAnnotation {
    pub id: String,
    /// The document both endpoints belong to.
    pub target: String,
    pub body: RelationBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationBody {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Last path segment of an annotation id.
pub fn id_base(id: &str) -> &str {
    id.rsplit_once('/').map(|(_, base)| base).unwrap_or(id)
}

/// Annotation id without its last path segment.
pub fn id_path(id: &str) -> &str {
    id.rsplit_once('/').map(|(path, _)| path).unwrap_or("")
}

fn split_target(target: &str) -> (&str, &str) {
    target.split_once('#').unwrap_or((target, ""))
}

impl SpanAnnotation {
    pub fn document(&self) -> &str {
        split_target(&self.target).0
    }

    /// Character offsets from the `#char=START,END` target fragment.
    pub fn char_range(&self) -> Result<(usize, usize), PubtatorError> {
        let fragment = split_target(&self.target).1;
        let caps = FRAGMENT_RE
            .captures(fragment)
            .ok_or_else(|| PubtatorError::InvalidFragment(fragment.to_string()))?;
        let offset = |index: usize| {
            caps[index]
                .parse::<usize>()
                .map_err(|_| PubtatorError::InvalidFragment(fragment.to_string()))
        };
        Ok((offset(1)?, offset(2)?))
    }

    pub fn body_id(&self) -> Option<&str> {
        self.body.get("id").and_then(Value::as_str)
    }

    pub fn body_type(&self) -> Option<&str> {
        self.body.get("type").and_then(Value::as_str)
    }

    /// Sentence and title spans segment the text rather than mark entities.
    pub fn is_segment(&self) -> bool {
        self.body_type()
            .map(|kind| matches!(kind.to_lowercase().as_str(), "sentence" | "title"))
            .unwrap_or(false)
    }

    /// String identifying the annotated entity: the normalized id, or the
    /// lowercased text for unnormalized mentions.
    pub fn identity(&self) -> String {
        match self.body_id() {
            Some(id) => id.to_string(),
            None => format!("text:{}", self.text.to_lowercase()),
        }
    }
}

impl WebAnnotation {
    pub fn id(&self) -> &str {
        match self {
            WebAnnotation::Span(span) => &span.id,
            WebAnnotation::Relation(relation) => &relation.id,
        }
    }

    pub fn id_base(&self) -> &str {
        id_base(self.id())
    }

    pub fn id_path(&self) -> &str {
        id_path(self.id())
    }

    pub fn as_span(&self) -> Option<&SpanAnnotation> {
        match self {
            WebAnnotation::Span(span) => Some(span),
            WebAnnotation::Relation(_) => None,
        }
    }

    /// Rename this annotation and the annotations it refers to.
    pub fn remap_ids(&mut self, id_map: &HashMap<String, String>) {
        let remap = |id: &mut String| {
            if let Some(new_id) = id_map.get(id.as_str()) {
                *id = new_id.clone();
            }
        };
        match self {
            WebAnnotation::Span(span) => remap(&mut span.id),
            WebAnnotation::Relation(relation) => {
                remap(&mut relation.id);
                remap(&mut relation.body.from);
                remap(&mut relation.body.to);
            }
        }
    }
}

pub fn parse_annotations(content: &str, name: &str) -> Result<Vec<WebAnnotation>, PubtatorError> {
    let values: Vec<Value> = serde_json::from_str(content).map_err(|err| PubtatorError::Json {
        path: name.to_string(),
        message: err.to_string(),
    })?;
    let mut annotations = Vec::with_capacity(values.len());
    let mut ids = HashSet::new();
    for value in values {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_string);
        let annotation: WebAnnotation = match kind.as_deref() {
            Some("Span") | Some("Relation") => {
                serde_json::from_value(value).map_err(|err| PubtatorError::Json {
                    path: name.to_string(),
                    message: err.to_string(),
                })?
            }
            Some(other) => {
                return Err(PubtatorError::UnsupportedAnnotation(format!(
                    "annotation type {other}"
                )));
            }
            None => {
                return Err(PubtatorError::UnsupportedAnnotation(format!(
                    "annotation without type: {value}"
                )));
            }
        };
        if !ids.insert(annotation.id().to_string()) {
            return Err(PubtatorError::DuplicateAnnotationId {
                path: name.to_string(),
                id: annotation.id().to_string(),
            });
        }
        annotations.push(annotation);
    }
    Ok(annotations)
}

/// Read the annotations of a `.jsonld` file.
pub fn read_annotations(path: &Path) -> Result<Vec<WebAnnotation>, PubtatorError> {
    if path.extension().is_none_or(|ext| ext != "jsonld") {
        return Err(PubtatorError::UnsupportedFile(path.display().to_string()));
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", path.display())))?;
    parse_annotations(&content, &path.display().to_string())
}

pub fn annotations_json(annotations: &[WebAnnotation]) -> Result<String, PubtatorError> {
    to_pretty_json(&annotations).map_err(|err| PubtatorError::Json {
        path: String::new(),
        message: err.to_string(),
    })
}

pub fn write_annotations(path: &Path, annotations: &[WebAnnotation]) -> Result<(), PubtatorError> {
    write_atomic(path, annotations_json(annotations)?.as_bytes())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const FILE: &str = r#"[
  {
    "body": {"id": "NCBIGENE:6647", "type": "Gene"},
    "id": "PMID:1/ann/0",
    "target": "PMID:1/text#char=0,4",
    "text": "SOD1",
    "type": "Span",
    "score": 0.5
  },
  {
    "body": {"from": "PMID:1/ann/0", "to": "PMID:1/ann/0", "type": "Cooccurrence"},
    "id": "PMID:1/ann/1",
    "target": "PMID:1",
    "type": "Relation"
  }
]"#;

    #[test]
    fn parses_spans_and_relations() {
        let annotations = parse_annotations(FILE, "test").unwrap();
        let span = annotations[0].as_span().unwrap();
        assert_eq!(span.char_range().unwrap(), (0, 4));
        assert_eq!(span.document(), "PMID:1/text");
        assert_eq!(span.identity(), "NCBIGENE:6647");
        assert_eq!(span.other.get("score"), Some(&serde_json::json!(0.5)));
        assert_eq!(annotations[1].id_base(), "1");
        assert_eq!(annotations[1].id_path(), "PMID:1/ann");
        assert_matches!(&annotations[1], WebAnnotation::Relation(rel) if rel.body.kind == "Cooccurrence");
    }

    #[test]
    fn serializes_back_with_sorted_keys() {
        let annotations = parse_annotations(FILE, "test").unwrap();
        let json = annotations_json(&annotations).unwrap();
        let reparsed = parse_annotations(&json, "test").unwrap();
        assert_eq!(reparsed, annotations);
        let first_keys = json
            .lines()
            .filter(|line| line.starts_with("    \""))
            .take(6)
            .map(|line| line.trim().split('"').nth(1).unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(first_keys, vec!["body", "id", "score", "target", "text", "type"]);
    }

    #[test]
    fn rejects_duplicates_and_unknown_types() {
        let duplicate = r#"[{"type":"Span","id":"a","target":"d#char=0,1","body":{},"text":"x"},
                           {"type":"Span","id":"a","target":"d#char=1,2","body":{},"text":"y"}]"#;
        assert_matches!(
            parse_annotations(duplicate, "dup"),
            Err(PubtatorError::DuplicateAnnotationId { .. })
        );
        let unknown = r#"[{"type":"Note","id":"a"}]"#;
        assert_matches!(
            parse_annotations(unknown, "unknown"),
            Err(PubtatorError::UnsupportedAnnotation(_))
        );
    }

    #[test]
    fn segment_spans_are_recognized() {
        let span = r#"[{"type":"Span","id":"a","target":"d#char=0,1","body":{"type":"Sentence"},"text":"x"}]"#;
        let annotations = parse_annotations(span, "s").unwrap();
        assert!(annotations[0].as_span().unwrap().is_segment());
        assert_eq!(annotations[0].as_span().unwrap().identity(), "text:x");
    }
}
