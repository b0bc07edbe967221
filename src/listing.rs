use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::sync::LazyLock;

use regex::Regex;

use crate::app::{PROGRESS_INTERVAL, ProgressEvent, ProgressSink};
use crate::error::PubtatorError;
use crate::pubtator::PubtatorReader;

static LEADING_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)").unwrap());

/// Lines between two progress events of `filter`.
pub const FILTER_PROGRESS_INTERVAL: usize = 100_000;

fn write_error(err: std::io::Error) -> PubtatorError {
    PubtatorError::Filesystem(format!("write output: {err}"))
}

/// Prints document ids, stopping after `limit` ids across all inputs.
pub struct IdLister<W: Write> {
    out: W,
    limit: Option<usize>,
    listed: usize,
}

impl<W: Write> IdLister<W> {
    pub fn new(out: W, limit: Option<usize>) -> Self {
        Self {
            out,
            limit,
            listed: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| limit > 0 && self.listed >= limit)
    }

    pub fn listed(&self) -> usize {
        self.listed
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// List the ids of one input, returning the number of documents read.
    pub fn list_stream<R: BufRead>(
        &mut self,
        name: &str,
        reader: R,
        sink: &dyn ProgressSink,
    ) -> Result<usize, PubtatorError> {
        if self.exhausted() {
            return Ok(0);
        }
        let mut read = 0usize;
        for document in PubtatorReader::new(name, reader) {
            let document = document?;
            read += 1;
            if read % PROGRESS_INTERVAL == 0 {
                sink.event(ProgressEvent::processed(read));
            }
            writeln!(self.out, "{}", document.id).map_err(write_error)?;
            self.listed += 1;
            if self.exhausted() {
                break;
            }
        }
        sink.event(ProgressEvent {
            message: format!("Completed {name}, processed {read} documents."),
            processed: read,
        });
        Ok(read)
    }
}

/// Copy the lines of documents whose id is in `ids`, separating documents
/// with an empty line. Returns the number of lines read.
pub fn filter_pubtator<R: BufRead, W: Write>(
    reader: R,
    ids: &HashSet<String>,
    out: &mut W,
    sink: &dyn ProgressSink,
) -> Result<usize, PubtatorError> {
    let mut in_selected = false;
    let mut count = 0usize;
    for line in reader.lines() {
        let line = line.map_err(|err| PubtatorError::Filesystem(format!("read input: {err}")))?;
        count += 1;
        let selected = LEADING_ID_RE
            .captures(&line)
            .is_some_and(|caps| ids.contains(&caps[1]));
        if selected {
            writeln!(out, "{line}").map_err(write_error)?;
            in_selected = true;
        } else {
            if in_selected {
                writeln!(out).map_err(write_error)?;
            }
            in_selected = false;
        }
        if count % FILTER_PROGRESS_INTERVAL == 0 {
            sink.event(ProgressEvent {
                message: format!("Processed {count} lines ..."),
                processed: count,
            });
        }
    }
    sink.event(ProgressEvent {
        message: format!("Done, processed {count} lines."),
        processed: count,
    });
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl ProgressSink for Quiet {
        fn event(&self, _event: ProgressEvent) {}
    }

    const INPUT: &str = "1|t|One\n1|a|First.\n\n2|t|Two\n2|a|Second.\n2\t0\t3\tTwo\tGene\t1\n\n3|t|Three\n3|a|Third.\n";

    #[test]
    fn lists_ids_up_to_limit() {
        let mut lister = IdLister::new(Vec::new(), Some(2));
        lister.list_stream("a", INPUT.as_bytes(), &Quiet).unwrap();
        assert_eq!(lister.list_stream("b", INPUT.as_bytes(), &Quiet).unwrap(), 0);
        assert_eq!(String::from_utf8(lister.into_inner()).unwrap(), "1\n2\n");

        let mut lister = IdLister::new(Vec::new(), Some(0));
        assert_eq!(lister.list_stream("a", INPUT.as_bytes(), &Quiet).unwrap(), 3);
    }

    #[test]
    fn invalid_documents_are_not_listed() {
        let input = "1|t|One\n1\t0\t3\tOne\tGene\t-\n\n2|t|Two\n";
        let mut lister = IdLister::new(Vec::new(), None);
        assert_eq!(lister.list_stream("a", input.as_bytes(), &Quiet).unwrap(), 1);
        assert_eq!(String::from_utf8(lister.into_inner()).unwrap(), "2\n");
    }

    #[test]
    fn filters_selected_documents() {
        let ids = HashSet::from(["2".to_string(), "3".to_string()]);
        let mut out = Vec::new();
        let lines = filter_pubtator(INPUT.as_bytes(), &ids, &mut out, &Quiet).unwrap();
        assert_eq!(lines, 9);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "2|t|Two\n2|a|Second.\n2\t0\t3\tTwo\tGene\t1\n\n3|t|Three\n3|a|Third.\n"
        );
    }
}
