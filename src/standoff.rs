use std::collections::HashSet;

use crate::domain::{Namespaces, output_type};
use crate::error::PubtatorError;
use crate::pubtator::{Annotation, Document, SpanAnnotation};

/// First `prefix` + i (i = 1, 2, ...) not yet taken.
fn next_in_seq(prefix: char, taken: &HashSet<String>) -> String {
    let mut i = 1usize;
    loop {
        let id = format!("{prefix}{i}");
        if !taken.contains(&id) {
            return id;
        }
        i += 1;
    }
}

/// Standoff lines for one span: a `T` text-bound line followed by one
/// `N` reference line per normalization.
pub fn span_lines(
    span: &SpanAnnotation,
    namespaces: &Namespaces,
    taken: &mut HashSet<String>,
) -> Result<Vec<String>, PubtatorError> {
    let tid = next_in_seq('T', taken);
    let mut lines = vec![format!(
        "{tid}\t{} {} {}\t{}",
        output_type(&span.kind),
        span.start,
        span.end,
        span.text
    )];
    taken.insert(tid.clone());
    for norm in span.norms(namespaces)?.into_iter().flatten() {
        let nid = next_in_seq('N', taken);
        lines.push(format!("{nid}\tReference {tid} {norm}\t{}", span.text));
        taken.insert(nid);
    }
    Ok(lines)
}

pub fn document_lines(
    document: &Document,
    namespaces: &Namespaces,
) -> Result<Vec<String>, PubtatorError> {
    let mut taken = HashSet::new();
    let mut lines = Vec::new();
    for annotation in &document.annotations {
        match annotation {
            Annotation::Span(span) => lines.extend(span_lines(span, namespaces, &mut taken)?),
            // Standoff has no document-level relations.
            Annotation::Relation(_) => {
                tracing::warn!("not converting RelationAnnotation in {}", document.id)
            }
        }
    }
    Ok(lines)
}

/// Content of the `.ann` file for `document`.
pub fn to_ann(document: &Document, namespaces: &Namespaces) -> Result<String, PubtatorError> {
    let mut content = String::new();
    for line in document_lines(document, namespaces)? {
        content.push_str(&line);
        content.push('\n');
    }
    Ok(content)
}
