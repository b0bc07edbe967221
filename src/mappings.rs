use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::cooccurrence::pair_identity;
use crate::error::PubtatorError;
use crate::fs_util::read_json;
use crate::webannotation::{SpanAnnotation, WebAnnotation, read_annotations};

/// Mention text to id to occurrence count.
pub type Mappings = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct MappingOptions {
    /// Keep mappings of sentence-level hallmark annotations.
    pub all: bool,
    pub min_count: u64,
    pub min_ratio: f64,
}

fn excluded(span: &SpanAnnotation, options: &MappingOptions) -> bool {
    !options.all
        && span
            .body_type()
            .is_some_and(|kind| kind.to_lowercase().contains("hallmark"))
}

/// Count the text-to-id mappings of one annotation file into `mappings`.
pub fn collect_file(
    path: &Path,
    options: &MappingOptions,
    mappings: &mut Mappings,
) -> Result<(), PubtatorError> {
    let annotations = read_annotations(path)?;
    collect(&annotations, options, mappings);
    Ok(())
}

pub fn collect(annotations: &[WebAnnotation], options: &MappingOptions, mappings: &mut Mappings) {
    for span in annotations.iter().filter_map(WebAnnotation::as_span) {
        let Some(id) = span.body_id() else {
            continue;
        };
        if excluded(span, options) {
            continue;
        }
        *mappings
            .entry(span.text.clone())
            .or_default()
            .entry(id.to_string())
            .or_default() += 1;
    }
}

/// Drop rare and relatively infrequent ids, then texts left without ids.
pub fn filter_mappings(mappings: &mut Mappings, min_count: u64, min_ratio: f64) {
    let mut filtered = 0usize;
    for ids in mappings.values_mut() {
        let before = ids.len();
        if min_count > 0 {
            ids.retain(|_, count| *count >= min_count);
        }
        if min_ratio > 0.0
            && let Some(max) = ids.values().copied().max()
        {
            ids.retain(|_, count| (*count as f64) / (max as f64) >= min_ratio);
        }
        filtered += before - ids.len();
    }
    mappings.retain(|_, ids| !ids.is_empty());
    let kept = mappings.values().map(BTreeMap::len).sum::<usize>();
    tracing::info!("Filtered {filtered}, kept {kept}");
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStatistics {
    pub strings: usize,
    pub ambiguous_strings: usize,
    pub ids: usize,
    pub ambiguous_ids: usize,
    pub mentions: u64,
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

impl MappingStatistics {
    pub fn of(mappings: &Mappings) -> Self {
        let mut texts_per_id: HashMap<&str, usize> = HashMap::new();
        let mut statistics = Self {
            strings: mappings.len(),
            ..Self::default()
        };
        for ids in mappings.values() {
            statistics.mentions += ids.values().sum::<u64>();
            if ids.len() > 1 {
                statistics.ambiguous_strings += 1;
            }
            for id in ids.keys() {
                *texts_per_id.entry(id).or_default() += 1;
            }
        }
        statistics.ids = texts_per_id.len();
        statistics.ambiguous_ids = texts_per_id.values().filter(|count| **count > 1).count();
        statistics
    }

    pub fn lines(&self) -> Vec<String> {
        vec![
            format!(
                "{} strings, {} ({:.1}%) ambiguous",
                self.strings,
                self.ambiguous_strings,
                percent(self.ambiguous_strings, self.strings)
            ),
            format!(
                "{} ids, {} ({:.1}%) ambiguous",
                self.ids,
                self.ambiguous_ids,
                percent(self.ambiguous_ids, self.ids)
            ),
            format!("{} total mentions", self.mentions),
        ]
    }

    /// Write the summary lines, one per line, to `out`.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for line in self.lines() {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

pub fn read_mappings(path: &Path) -> Result<Mappings, PubtatorError> {
    serde_json::from_value(read_json(path)?).map_err(|err| PubtatorError::Json {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Swap the two levels: id to text to count.
pub fn invert(mappings: &Mappings) -> Mappings {
    let mut inverted = Mappings::new();
    for (text, ids) in mappings {
        for (id, count) in ids {
            inverted
                .entry(id.clone())
                .or_default()
                .insert(text.clone(), *count);
        }
    }
    inverted
}

/// Most frequent value per key; ties go to the first value in sort order.
pub fn best(mappings: &Mappings) -> BTreeMap<String, String> {
    mappings
        .iter()
        .filter_map(|(key, values)| {
            let mut best: Option<(&String, u64)> = None;
            for (value, count) in values {
                if best.is_none_or(|(_, max)| *count > max) {
                    best = Some((value, *count));
                }
            }
            best.map(|(value, _)| (key.clone(), value.clone()))
        })
        .collect()
}

/// Entity identity pair for every relation of an annotation file.
pub fn related_pairs(path: &Path) -> Result<Vec<(String, String)>, PubtatorError> {
    let annotations = read_annotations(path)?;
    relation_pairs(&annotations)
}

pub fn relation_pairs(annotations: &[WebAnnotation]) -> Result<Vec<(String, String)>, PubtatorError> {
    let spans = annotations
        .iter()
        .filter_map(WebAnnotation::as_span)
        .map(|span| (span.id.as_str(), span))
        .collect::<HashMap<_, _>>();
    let lookup = |relation: &str, target: &str| {
        spans
            .get(target)
            .copied()
            .ok_or_else(|| PubtatorError::DanglingRelation {
                relation: relation.to_string(),
                target: target.to_string(),
            })
    };
    let mut pairs = Vec::new();
    for annotation in annotations {
        if let WebAnnotation::Relation(relation) = annotation {
            let from = lookup(&relation.id, &relation.body.from)?;
            let to = lookup(&relation.id, &relation.body.to)?;
            pairs.push(pair_identity(from, to));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::webannotation::parse_annotations;

    fn mappings(entries: &[(&str, &str, u64)]) -> Mappings {
        let mut mappings = Mappings::new();
        for (text, id, count) in entries {
            mappings
                .entry(text.to_string())
                .or_default()
                .insert(id.to_string(), *count);
        }
        mappings
    }

    #[test]
    fn collects_and_skips_hallmarks() {
        let annotations = parse_annotations(
            r#"[
              {"type":"Span","id":"a/0","target":"a#char=0,4","body":{"type":"Gene","id":"G:1"},"text":"SOD1"},
              {"type":"Span","id":"a/1","target":"a#char=5,9","body":{"type":"Gene","id":"G:1"},"text":"SOD1"},
              {"type":"Span","id":"a/2","target":"a#char=0,9","body":{"type":"Hallmark","id":"H:1"},"text":"SOD1 SOD1"},
              {"type":"Span","id":"a/3","target":"a#char=0,9","body":{"type":"sentence"},"text":"SOD1 SOD1"}
            ]"#,
            "test",
        )
        .unwrap();
        let mut collected = Mappings::new();
        collect(&annotations, &MappingOptions::default(), &mut collected);
        assert_eq!(collected, mappings(&[("SOD1", "G:1", 2)]));

        let mut all = Mappings::new();
        let options = MappingOptions {
            all: true,
            ..MappingOptions::default()
        };
        collect(&annotations, &options, &mut all);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn filters_by_count_and_ratio() {
        let mut collected = mappings(&[("cu", "A", 10), ("cu", "B", 2), ("x", "C", 1)]);
        filter_mappings(&mut collected, 2, 0.0);
        assert_eq!(collected, mappings(&[("cu", "A", 10), ("cu", "B", 2)]));
        filter_mappings(&mut collected, 0, 0.5);
        assert_eq!(collected, mappings(&[("cu", "A", 10)]));
    }

    #[test]
    fn statistics_handle_empty_mappings() {
        let statistics = MappingStatistics::of(&Mappings::new());
        assert_eq!(statistics, MappingStatistics::default());
        assert_eq!(statistics.lines()[0], "0 strings, 0 (0.0%) ambiguous");
        let mut summary = Vec::new();
        statistics.write_to(&mut summary).unwrap();
        assert_eq!(
            String::from_utf8(summary).unwrap(),
            "0 strings, 0 (0.0%) ambiguous\n0 ids, 0 (0.0%) ambiguous\n0 total mentions\n"
        );

        let statistics =
            MappingStatistics::of(&mappings(&[("cu", "A", 3), ("cu", "B", 1), ("copper", "A", 2)]));
        assert_eq!(statistics.strings, 2);
        assert_eq!(statistics.ambiguous_strings, 1);
        assert_eq!(statistics.ids, 2);
        assert_eq!(statistics.ambiguous_ids, 1);
        assert_eq!(statistics.mentions, 6);
    }

    #[test]
    fn invert_and_best() {
        let collected = mappings(&[("cu", "A", 3), ("cu", "B", 3), ("copper", "A", 5)]);
        let inverted = invert(&collected);
        assert_eq!(inverted, mappings(&[("A", "cu", 3), ("A", "copper", 5), ("B", "cu", 3)]));
        let chosen = best(&collected);
        assert_eq!(chosen["cu"], "A");
        assert_eq!(best(&inverted)["A"], "copper");
    }

    #[test]
    fn relations_need_known_endpoints() {
        let annotations = parse_annotations(
            r#"[
              {"type":"Span","id":"a/0","target":"a#char=0,4","body":{"type":"Gene","id":"G:1"},"text":"SOD1"},
              {"type":"Span","id":"a/1","target":"a#char=5,7","body":{"type":"Chemical"},"text":"Cu"},
              {"type":"Relation","id":"a/2","target":"a","body":{"type":"Cooccurrence","from":"a/0","to":"a/1"}}
            ]"#,
            "test",
        )
        .unwrap();
        assert_eq!(
            relation_pairs(&annotations).unwrap(),
            vec![("text:cu".to_string(), "G:1".to_string())]
        );

        let dangling = parse_annotations(
            r#"[{"type":"Relation","id":"a/2","target":"a","body":{"type":"Cooccurrence","from":"a/0","to":"a/1"}}]"#,
            "test",
        )
        .unwrap();
        assert_matches!(
            relation_pairs(&dangling),
            Err(PubtatorError::DanglingRelation { .. })
        );
    }
}
