use std::collections::HashSet;
use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;

use crate::domain::Namespaces;
use crate::error::PubtatorError;

// Embedded text, span annotation and relation annotation lines.
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\|(.)\|(.*)$").unwrap());

static SPAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\t(\d+)\t(\d+)\t([^\t]+)\t(\S+)\t*(\S*)(?:\t(.*))?\s*$").unwrap()
});

static REL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\t(\S+)\t(\S+)\t(\S+)\s*$").unwrap());

static NORM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]").unwrap());

static TAXONOMY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\(Tax:\d+\)$").unwrap());

pub fn is_text_line(line: &str) -> bool {
    TEXT_RE.is_match(line)
}

pub fn is_span_line(line: &str) -> bool {
    SPAN_RE.is_match(line)
}

pub fn is_relation_line(line: &str) -> bool {
    REL_RE.is_match(line)
}

/// Return the substring between character offsets `start` and `end`.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let byte_at = |offset: usize| {
        text.char_indices()
            .map(|(index, _)| index)
            .chain(std::iter::once(text.len()))
            .nth(offset)
    };
    let from = byte_at(start)?;
    let to = byte_at(end)?;
    Some(&text[from..to])
}

/// PubTator span annotation (entity mention).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanAnnotation {
    pub document: String,
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub kind: String,
    pub norm: Option<String>,
    /// Component mentions of coordinated spans such as
    /// "visual or auditory toxicity" -> "visual toxicity|auditory toxicity".
    pub substrings: Option<String>,
}

impl SpanAnnotation {
    pub fn new(
        document: impl Into<String>,
        start: usize,
        end: usize,
        text: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            document: document.into(),
            start,
            end,
            text: text.into(),
            kind: kind.into(),
            norm: None,
            substrings: None,
        }
    }

    pub fn parse(line: &str, line_number: usize) -> Result<Self, PubtatorError> {
        let caps = SPAN_RE.captures(line).ok_or_else(|| PubtatorError::Parse {
            line: line_number,
            message: format!("failed to parse as span: \"{line}\""),
        })?;
        let offset = |index: usize| {
            caps[index].parse::<usize>().map_err(|err| PubtatorError::Parse {
                line: line_number,
                message: format!("invalid offset {}: {err}", &caps[index]),
            })
        };
        let optional = |index: usize| {
            caps.get(index)
                .map(|m| m.as_str().to_string())
                .filter(|value| !value.is_empty())
        };
        Ok(Self {
            document: caps[1].to_string(),
            start: offset(2)?,
            end: offset(3)?,
            text: caps[4].to_string(),
            kind: caps[5].to_string(),
            norm: optional(6),
            substrings: optional(7),
        })
    }

    /// Normalized ids, or a single `None` when the mention is unnormalized.
    pub fn norms(&self, namespaces: &Namespaces) -> Result<Vec<Option<String>>, PubtatorError> {
        let Some(raw) = self.norm.as_deref().filter(|norm| !norm.trim().is_empty()) else {
            return Ok(vec![None]);
        };
        split_norm(raw, &self.kind)
            .into_iter()
            .map(|norm| {
                let norm = if norm.contains("(Tax:") {
                    strip_taxonomy_id(norm)?
                } else {
                    norm.to_string()
                };
                if norm.contains(':') {
                    Ok(Some(norm))
                } else {
                    Ok(Some(format!(
                        "{}:{norm}",
                        namespaces.namespace_for(&self.kind)
                    )))
                }
            })
            .collect()
    }

    pub fn validate(&self, text: &str) -> Result<(), PubtatorError> {
        let covered = char_slice(text, self.start, self.end);
        if covered != Some(self.text.as_str()) {
            tracing::warn!(
                "text mismatch: {} in {} ({}-{}): \"{}\" vs. \"{}\"",
                self.kind,
                self.document,
                self.start,
                self.end,
                covered.unwrap_or_default(),
                self.text
            );
        }
        if let Some(norm) = &self.norm {
            if !NORM_RE.is_match(norm) {
                return Err(PubtatorError::InvalidNorm {
                    document: self.document.clone(),
                    kind: self.kind.clone(),
                    text: self.text.clone(),
                    start: self.start,
                    end: self.end,
                    norm: norm.clone(),
                });
            }
        }
        self.norms(&Namespaces::default()).map(|_| ())
    }
}

/// Return the ids contained in a PubTator normalization value.
///
/// Several ids appear as `6647;6648` for any type, or as
/// `MESH:C029954|MESH:D007065` for chemicals only: mutation norms such as
/// `c|SUB|C|677|T` use `|` internally.
pub fn split_norm<'a>(norm: &'a str, kind: &str) -> Vec<&'a str> {
    if norm.contains(';') {
        norm.split(';').collect()
    } else if norm.contains('|') && kind == "Chemical" {
        norm.split('|').collect()
    } else {
        vec![norm]
    }
}

pub fn strip_taxonomy_id(norm: &str) -> Result<String, PubtatorError> {
    TAXONOMY_RE
        .captures(norm)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| PubtatorError::InvalidTaxonomyId(norm.to_string()))
}

/// PubTator document-level binary relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationAnnotation {
    pub document: String,
    pub kind: String,
    pub arg1: String,
    pub arg2: String,
}

impl RelationAnnotation {
    pub fn parse(line: &str, line_number: usize) -> Result<Self, PubtatorError> {
        let caps = REL_RE.captures(line).ok_or_else(|| PubtatorError::Parse {
            line: line_number,
            message: line.to_string(),
        })?;
        Ok(Self {
            document: caps[1].to_string(),
            kind: caps[2].to_string(),
            arg1: caps[3].to_string(),
            arg2: caps[4].to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Span(SpanAnnotation),
    Relation(RelationAnnotation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSection {
    pub label: char,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub sections: Vec<TextSection>,
    pub annotations: Vec<Annotation>,
}

impl Document {
    pub fn text(&self) -> String {
        self.sections
            .iter()
            .map(|section| section.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn title(&self) -> String {
        self.sections
            .iter()
            .filter(|section| section.label == 't')
            .map(|section| section.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn abstracts(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .filter(|section| section.label == 'a')
            .map(|section| section.text.as_str())
    }

    pub fn spans(&self) -> impl Iterator<Item = &SpanAnnotation> {
        self.annotations.iter().filter_map(|annotation| match annotation {
            Annotation::Span(span) => Some(span),
            Annotation::Relation(_) => None,
        })
    }

    pub fn validate(&self) -> Result<(), PubtatorError> {
        let text = self.text();
        for annotation in &self.annotations {
            if let Annotation::Span(span) = annotation {
                span.validate(&text)?;
            }
        }
        Ok(())
    }
}

/// Streaming reader yielding the documents of a PubTator file.
///
/// A document that fails to parse is logged and skipped; the reader resumes
/// at the next text line. Read failures of the underlying source end the
/// iteration with an error.
pub struct PubtatorReader<R: BufRead> {
    source: String,
    reader: R,
    lookahead: Option<String>,
    primed: bool,
    line: usize,
    ids: Option<HashSet<String>>,
    errors: usize,
    finished: bool,
}

impl<R: BufRead> PubtatorReader<R> {
    pub fn new(source: impl Into<String>, reader: R) -> Self {
        Self {
            source: source.into(),
            reader,
            lookahead: None,
            primed: false,
            line: 0,
            ids: None,
            errors: 0,
            finished: false,
        }
    }

    /// Only yield documents whose id is in `ids`.
    pub fn with_ids(mut self, ids: Option<HashSet<String>>) -> Self {
        self.ids = ids;
        self
    }

    /// Number of documents skipped because of errors so far.
    pub fn errors(&self) -> usize {
        self.errors
    }

    fn read_raw(&mut self) -> Result<Option<String>, PubtatorError> {
        let mut buffer = String::new();
        let read = self
            .reader
            .read_line(&mut buffer)
            .map_err(|err| PubtatorError::Filesystem(format!("read {}: {err}", self.source)))?;
        if read == 0 {
            return Ok(None);
        }
        let trimmed = buffer.trim_end_matches(['\n', '\r']).len();
        buffer.truncate(trimmed);
        Ok(Some(buffer))
    }

    fn peek(&mut self) -> Result<Option<&str>, PubtatorError> {
        if !self.primed {
            self.lookahead = self.read_raw()?;
            self.primed = true;
        }
        Ok(self.lookahead.as_deref())
    }

    fn next_line(&mut self) -> Result<Option<String>, PubtatorError> {
        self.peek()?;
        let current = self.lookahead.take();
        if current.is_some() {
            self.line += 1;
            self.lookahead = self.read_raw()?;
        }
        Ok(current)
    }

    fn peek_is_text(&mut self) -> Result<bool, PubtatorError> {
        Ok(self.peek()?.map(is_text_line).unwrap_or(false))
    }

    fn skip_blank_lines(&mut self) -> Result<(), PubtatorError> {
        while self
            .peek()?
            .map(|line| line.trim().is_empty())
            .unwrap_or(false)
        {
            self.next_line()?;
        }
        Ok(())
    }

    /// Skip the next document if an id filter excludes it.
    fn skip_filtered(&mut self) -> Result<bool, PubtatorError> {
        let Some(ids) = &self.ids else {
            return Ok(false);
        };
        let Some(line) = self.lookahead.as_deref() else {
            return Ok(false);
        };
        let caps = TEXT_RE.captures(line).ok_or_else(|| PubtatorError::Parse {
            line: self.line + 1,
            message: line.to_string(),
        })?;
        if ids.contains(&caps[1]) {
            return Ok(false);
        }
        while let Some(line) = self.next_line()? {
            if line.trim().is_empty() {
                break;
            }
        }
        Ok(true)
    }

    fn read_document(&mut self) -> Result<Document, PubtatorError> {
        let mut document_id: Option<String> = None;
        let mut sections = Vec::new();

        while let Some(line) = self.next_line()? {
            let caps = TEXT_RE.captures(&line).ok_or_else(|| PubtatorError::Parse {
                line: self.line,
                message: format!("expected text, got: {line}"),
            })?;
            let id = &caps[1];
            if document_id.as_deref().is_some_and(|known| known != id) {
                return Err(PubtatorError::Parse {
                    line: self.line,
                    message: format!("doc ID mismatch: {line}"),
                });
            }
            document_id = Some(id.to_string());
            let text = &caps[3];
            if !text.trim().is_empty() {
                sections.push(TextSection {
                    label: caps[2].chars().next().unwrap_or(' '),
                    text: text.to_string(),
                });
            }
            if !self.peek_is_text()? {
                break;
            }
        }

        let mut annotations = Vec::new();
        while let Some(line) = self.next_line()? {
            if line.trim().is_empty() {
                break;
            }
            if is_span_line(&line) {
                annotations.push(Annotation::Span(SpanAnnotation::parse(&line, self.line)?));
            } else if is_relation_line(&line) {
                annotations.push(Annotation::Relation(RelationAnnotation::parse(
                    &line, self.line,
                )?));
            } else {
                return Err(PubtatorError::Parse {
                    line: self.line,
                    message: line,
                });
            }
        }

        let document = Document {
            id: document_id.unwrap_or_default(),
            sections,
            annotations,
        };
        document.validate()?;
        Ok(document)
    }

    /// Skip the remaining lines of the current document.
    fn recover(&mut self) -> Result<(), PubtatorError> {
        while self.peek()?.is_some() && !self.peek_is_text()? {
            self.next_line()?;
        }
        Ok(())
    }

    fn next_document(&mut self) -> Result<Option<Document>, PubtatorError> {
        loop {
            self.skip_blank_lines()?;
            if self.peek()?.is_none() {
                return Ok(None);
            }
            let start_line = self.line + 1;
            let result = self
                .skip_filtered()
                .and_then(|skipped| if skipped { Ok(None) } else { self.read_document().map(Some) });
            match result {
                Ok(Some(document)) => return Ok(Some(document)),
                Ok(None) => continue,
                Err(err @ PubtatorError::Filesystem(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        "Error reading {} (lines {}-{}): {} (skipping...)",
                        self.source,
                        start_line,
                        self.line.max(start_line),
                        err
                    );
                    self.errors += 1;
                    self.recover()?;
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for PubtatorReader<R> {
    type Item = Result<Document, PubtatorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_document() {
            Ok(Some(document)) => Some(Ok(document)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    const SAMPLE: &str = "\
10022392|t|Sequence of the bovine gene.
10022392|a|SOD1 and 2 bind copper.
10022392\t29\t39\tSOD1 and 2\tGene\t6647;6648
10022392\t0\t8\tSequence\tChemical\tMESH:C1|MESH:D2

10022393|t|Mice.
10022393\t0\t4\tMice\tSpecies\t10090
";

    fn read_all(input: &str) -> (Vec<Document>, usize) {
        let mut reader = PubtatorReader::new("test", Cursor::new(input.as_bytes().to_vec()));
        let documents = reader.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        (documents, reader.errors())
    }

    #[test]
    fn reads_documents_and_sections() {
        let (documents, errors) = read_all(SAMPLE);
        assert_eq!(errors, 0);
        assert_eq!(documents.len(), 2);
        let first = &documents[0];
        assert_eq!(first.id, "10022392");
        assert_eq!(first.title(), "Sequence of the bovine gene.");
        assert_eq!(
            first.text(),
            "Sequence of the bovine gene.\nSOD1 and 2 bind copper."
        );
        assert_eq!(first.annotations.len(), 2);
    }

    #[test]
    fn splits_norms_by_type() {
        let (documents, _) = read_all(SAMPLE);
        let namespaces = Namespaces::default();
        let spans = documents[0].spans().collect::<Vec<_>>();
        assert_eq!(
            spans[0].norms(&namespaces).unwrap(),
            vec![
                Some("NCBIGENE:6647".to_string()),
                Some("NCBIGENE:6648".to_string())
            ]
        );
        assert_eq!(
            spans[1].norms(&namespaces).unwrap(),
            vec![Some("MESH:C1".to_string()), Some("MESH:D2".to_string())]
        );
        let mouse = documents[1].spans().next().unwrap();
        assert_eq!(
            mouse.norms(&namespaces).unwrap(),
            vec![Some("NCBITaxon:10090".to_string())]
        );
    }

    #[test]
    fn mutation_norms_keep_pipes() {
        let span = SpanAnnotation::parse(
            "7564788\t192\t200\t677C-->T\tDNAMutation\tc|SUB|C|677|T",
            1,
        )
        .unwrap();
        assert_eq!(
            span.norms(&Namespaces::default()).unwrap(),
            vec![Some("DNAMutation:c|SUB|C|677|T".to_string())]
        );
    }

    #[test]
    fn strips_taxonomy_ids() {
        assert_eq!(strip_taxonomy_id("9606(Tax:9606)").unwrap(), "9606");
        assert_matches!(
            strip_taxonomy_id("x(Tax:9606)"),
            Err(PubtatorError::InvalidTaxonomyId(_))
        );
    }

    #[test]
    fn unnormalized_span_has_single_empty_norm() {
        let span = SpanAnnotation::parse("1\t0\t4\tMice\tSpecies\t", 1).unwrap();
        assert_eq!(span.norm, None);
        assert_eq!(span.norms(&Namespaces::default()).unwrap(), vec![None]);
    }

    #[test]
    fn reads_relations() {
        let input = "1|t|A b.\n1\tCID\tMESH:D1\tD2\n";
        let (documents, _) = read_all(input);
        assert_matches!(
            &documents[0].annotations[0],
            Annotation::Relation(rel) if rel.kind == "CID" && rel.arg2 == "D2"
        );
    }

    #[test]
    fn recovers_from_malformed_document() {
        let input = "\
1|t|First.
1\tnot a span line

2|t|Second.
2\t0\t6\tSecond\tGene\t7
";
        let (documents, errors) = read_all(input);
        assert_eq!(errors, 1);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "2");
    }

    #[test]
    fn rejects_doc_id_mismatch() {
        let input = "1|t|First.\n2|a|Other.\n";
        let (documents, errors) = read_all(input);
        assert!(documents.is_empty());
        assert_eq!(errors, 1);
    }

    #[test]
    fn rejects_norm_without_alphanumerics() {
        let input = "1|t|First.\n1\t0\t5\tFirst\tGene\t-\n";
        let (documents, errors) = read_all(input);
        assert!(documents.is_empty());
        assert_eq!(errors, 1);
    }

    #[test]
    fn filters_by_id() {
        let ids = HashSet::from(["10022393".to_string()]);
        let mut reader = PubtatorReader::new("test", Cursor::new(SAMPLE.as_bytes().to_vec()))
            .with_ids(Some(ids));
        let documents = reader.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "10022393");
        assert_eq!(reader.errors(), 0);
    }

    #[test]
    fn char_slice_uses_character_offsets() {
        let text = "αβγ δ";
        assert_eq!(char_slice(text, 1, 3), Some("βγ"));
        assert_eq!(char_slice(text, 4, 5), Some("δ"));
        assert_eq!(char_slice(text, 4, 6), None);
    }
}
