use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::PubtatorError;
use crate::webannotation::{
    RelationAnnotation, RelationBody, SpanAnnotation, WebAnnotation, id_path, read_annotations,
    write_annotations,
};

pub const COOCCURRENCE: &str = "Cooccurrence";

#[derive(Debug, Clone, Default)]
pub struct CoocOptions {
    /// Pair all annotations within this many characters instead of
    /// pairing within sentences.
    pub distance: Option<usize>,
    pub include_self: bool,
    pub include_repeated: bool,
}

#[derive(Debug, Clone, Copy)]
struct Located<'a> {
    span: &'a SpanAnnotation,
    start: usize,
    end: usize,
}

fn locate(span: &SpanAnnotation) -> Result<Located<'_>, PubtatorError> {
    let (start, end) = span.char_range()?;
    Ok(Located { span, start, end })
}

fn entity_spans(annotations: &[WebAnnotation]) -> Result<Vec<Located<'_>>, PubtatorError> {
    annotations
        .iter()
        .filter_map(WebAnnotation::as_span)
        .filter(|span| !span.is_segment())
        .map(locate)
        .collect()
}

fn sentence_spans(annotations: &[WebAnnotation]) -> Result<Vec<Located<'_>>, PubtatorError> {
    annotations
        .iter()
        .filter_map(WebAnnotation::as_span)
        .filter(|span| {
            span.body_type()
                .is_some_and(|kind| kind.eq_ignore_ascii_case("sentence"))
        })
        .map(locate)
        .collect()
}

/// Largest integer id base, ignoring (and warning about) the others.
pub fn max_id_base(annotations: &[WebAnnotation]) -> u64 {
    let mut max = 0;
    for annotation in annotations {
        match annotation.id_base().parse::<u64>() {
            Ok(base) => max = max.max(base),
            Err(_) => tracing::warn!("non-int ID base: {}", annotation.id_base()),
        }
    }
    max
}

/// Characters between two spans, 0 when they overlap.
pub fn span_distance(a: (usize, usize), b: (usize, usize)) -> usize {
    let (first, second) = if a.0 < b.0 { (a, b) } else { (b, a) };
    second.0.saturating_sub(first.1)
}

/// Unordered pair of entity identities, larger first.
pub fn pair_identity(a: &SpanAnnotation, b: &SpanAnnotation) -> (String, String) {
    let (first, second) = (a.identity(), b.identity());
    if first < second {
        (second, first)
    } else {
        (first, second)
    }
}

fn cooccurrence(
    id: String,
    a: &SpanAnnotation,
    b: &SpanAnnotation,
) -> Result<WebAnnotation, PubtatorError> {
    if a.document() != b.document() {
        return Err(PubtatorError::CrossDocument(
            a.id.clone(),
            b.id.clone(),
        ));
    }
    let (from, to) = if a.body_id().unwrap_or("") > b.body_id().unwrap_or("") {
        (b, a)
    } else {
        (a, b)
    };
    Ok(WebAnnotation::Relation(RelationAnnotation {
        id,
        target: a.document().to_string(),
        body: RelationBody {
            from: from.id.clone(),
            to: to.id.clone(),
            kind: COOCCURRENCE.to_string(),
        },
    }))
}

fn pair_spans(
    spans: &[Located<'_>],
    options: &CoocOptions,
    next_id: &mut u64,
) -> Result<Vec<WebAnnotation>, PubtatorError> {
    let mut relations = Vec::new();
    let mut seen = HashSet::new();
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            if a.span.document() != b.span.document() {
                tracing::warn!("annotations for different documents");
                continue;
            }
            if let Some(max) = options.distance
                && span_distance((a.start, a.end), (b.start, b.end)) > max
            {
                continue;
            }
            if !options.include_self && a.span.identity() == b.span.identity() {
                continue;
            }
            let pair = pair_identity(a.span, b.span);
            if seen.contains(&pair) && !options.include_repeated {
                continue;
            }
            seen.insert(pair);
            let id = format!("{}/{next_id}", id_path(&a.span.id));
            *next_id += 1;
            relations.push(cooccurrence(id, a.span, b.span)?);
        }
    }
    Ok(relations)
}

/// Co-occurrences between all entity annotations of the file, limited by
/// `options.distance` when set.
pub fn cooccurrences(
    annotations: &[WebAnnotation],
    options: &CoocOptions,
) -> Result<Vec<WebAnnotation>, PubtatorError> {
    let mut next_id = max_id_base(annotations) + 1;
    pair_spans(&entity_spans(annotations)?, options, &mut next_id)
}

/// Co-occurrences between entity annotations of the same sentence. An
/// annotation belongs to the first sentence covering one of its characters.
/// Files without sentence annotations are paired at document scope.
pub fn sentence_cooccurrences(
    annotations: &[WebAnnotation],
    options: &CoocOptions,
    name: &str,
) -> Result<Vec<WebAnnotation>, PubtatorError> {
    let sentences = sentence_spans(annotations)?;
    let entities = entity_spans(annotations)?;
    if !entities.is_empty() && sentences.is_empty() {
        tracing::warn!("no sentences in {name}, pairing annotations across the document");
        let mut next_id = max_id_base(annotations) + 1;
        return pair_spans(&entities, options, &mut next_id);
    }

    let mut sentence_at = HashMap::new();
    for (index, sentence) in sentences.iter().enumerate() {
        for offset in sentence.start..sentence.end {
            if sentence_at.insert(offset, index).is_some() {
                tracing::warn!("overlapping sentences in {name}");
            }
        }
    }

    let mut groups: Vec<Vec<Located<'_>>> = Vec::new();
    let mut group_of_sentence = HashMap::new();
    for entity in entities {
        let sentence = (entity.start..entity.end).find_map(|offset| sentence_at.get(&offset));
        match sentence {
            Some(sentence) => {
                let group = *group_of_sentence.entry(*sentence).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[group].push(entity);
            }
            None => tracing::warn!("failed to find sentence for annotation {}", entity.span.id),
        }
    }

    let mut next_id = max_id_base(annotations) + 1;
    let mut relations = Vec::new();
    for group in &groups {
        relations.extend(pair_spans(group, options, &mut next_id)?);
    }
    Ok(relations)
}

/// Append co-occurrence relations to `annotations`, returning how many were
/// added.
pub fn add_cooccurrences(
    annotations: &mut Vec<WebAnnotation>,
    options: &CoocOptions,
    name: &str,
) -> Result<usize, PubtatorError> {
    let relations = match options.distance {
        Some(_) => cooccurrences(annotations, options)?,
        None => sentence_cooccurrences(annotations, options, name)?,
    };
    let added = relations.len();
    annotations.extend(relations);
    Ok(added)
}

/// Rewrite `path` in place with co-occurrence relations added.
pub fn process_file(path: &Path, options: &CoocOptions) -> Result<usize, PubtatorError> {
    let mut annotations = read_annotations(path)?;
    let added = add_cooccurrences(&mut annotations, options, &path.display().to_string())?;
    write_annotations(path, &annotations)?;
    tracing::debug!("added {added} relations to {}", path.display());
    Ok(added)
}
