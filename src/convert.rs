use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::app::{PROGRESS_INTERVAL, ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::domain::OutputFormat;
use crate::error::PubtatorError;
use crate::fs_util::open_input;
use crate::jsonld;
use crate::output::to_pretty_json;
use crate::pubtator::{Document, PubtatorReader};
use crate::segment::segment;
use crate::standoff;

pub const DEFAULT_OUTPUT_DIR: &str = "converted";

/// Destination for converted files, addressed by paths relative to the
/// output root.
pub trait OutputWriter {
    fn write(&mut self, relative: &Utf8Path, content: &str) -> Result<(), PubtatorError>;
}

pub struct FilesystemWriter {
    base_dir: Utf8PathBuf,
    known_directories: HashSet<Utf8PathBuf>,
}

impl FilesystemWriter {
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            known_directories: HashSet::new(),
        }
    }

    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }
}

impl OutputWriter for FilesystemWriter {
    fn write(&mut self, relative: &Utf8Path, content: &str) -> Result<(), PubtatorError> {
        let path = if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.base_dir.join(relative)
        };
        if let Some(directory) = path.parent() {
            if !self.known_directories.contains(directory) {
                fs::create_dir_all(directory.as_std_path()).map_err(|err| {
                    PubtatorError::Filesystem(format!("create {directory}: {err}"))
                })?;
                self.known_directories.insert(directory.to_path_buf());
            }
        }
        let mut file = fs::File::create(path.as_std_path())
            .map_err(|err| PubtatorError::Filesystem(format!("create {path}: {err}")))?;
        file.write_all(content.as_bytes())
            .map_err(|err| PubtatorError::Filesystem(format!("write {path}: {err}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub format: OutputFormat,
    /// Group output under directories named by a document id prefix.
    pub subdirs: bool,
    /// Add title and sentence annotations.
    pub segment: bool,
    pub no_text: bool,
    pub ids: Option<HashSet<String>>,
    /// Stop after this many documents; 0 means no limit.
    pub limit: Option<usize>,
    /// Probability of keeping each document.
    pub random: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Standoff,
            subdirs: false,
            segment: false,
            no_text: false,
            ids: None,
            limit: None,
            random: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub path: String,
    pub documents: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertResult {
    pub inputs: Vec<InputSummary>,
    /// Documents written across all inputs.
    pub converted: usize,
    pub errors: usize,
    pub files_written: usize,
}

impl ConvertResult {
    pub fn into_result(self) -> Result<Self, PubtatorError> {
        if self.errors == 0 {
            Ok(self)
        } else {
            Err(PubtatorError::InvalidDocuments { count: self.errors })
        }
    }
}

/// Path of a document's output file, relative to the output root.
pub fn output_filename(
    document_id: &str,
    suffix: &str,
    subdirs: bool,
    config: &ResolvedConfig,
) -> Utf8PathBuf {
    let name = format!("{document_id}{suffix}");
    if subdirs {
        let prefix = document_id
            .chars()
            .take(config.subdir_prefix_len)
            .collect::<String>();
        Utf8PathBuf::from(prefix).join(name)
    } else {
        Utf8PathBuf::from(name)
    }
}

/// Annotation file content for `document` in `format`.
pub fn render(
    document: &Document,
    format: OutputFormat,
    config: &ResolvedConfig,
) -> Result<String, PubtatorError> {
    let namespaces = &config.namespaces;
    let value = match format {
        OutputFormat::Standoff => return standoff::to_ann(document, namespaces),
        OutputFormat::Json => jsonld::document_json(document, namespaces)?,
        OutputFormat::OaJsonld => jsonld::oa_annotations(document, namespaces, &config.oa_base)?,
        OutputFormat::WaJsonld => jsonld::wa_annotations(document, namespaces, &config.wa_base)?,
    };
    to_pretty_json(&value).map_err(|err| PubtatorError::Json {
        path: document.id.clone(),
        message: err.to_string(),
    })
}

pub struct Converter<'a, W: OutputWriter> {
    writer: &'a mut W,
    options: ConvertOptions,
    config: &'a ResolvedConfig,
    rng: Option<StdRng>,
    result: ConvertResult,
}

impl<'a, W: OutputWriter> Converter<'a, W> {
    pub fn new(
        writer: &'a mut W,
        options: ConvertOptions,
        config: &'a ResolvedConfig,
    ) -> Result<Self, PubtatorError> {
        let rng = match options.random {
            Some(ratio) if !(0.0..=1.0).contains(&ratio) => {
                return Err(PubtatorError::InvalidRatio(ratio));
            }
            Some(_) => Some(match options.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }),
            None => None,
        };
        Ok(Self {
            writer,
            options,
            config,
            rng,
            result: ConvertResult::default(),
        })
    }

    fn limit_reached(&self) -> bool {
        self.options
            .limit
            .is_some_and(|limit| limit > 0 && self.result.converted >= limit)
    }

    fn write_document(&mut self, document: &Document) -> Result<(), PubtatorError> {
        let subdirs = self.options.subdirs;
        if !self.options.no_text {
            let mut text = document.text();
            if !text.ends_with('\n') {
                text.push('\n');
            }
            let path = output_filename(&document.id, ".txt", subdirs, self.config);
            self.writer.write(&path, &text)?;
            self.result.files_written += 1;
        }
        let content = render(document, self.options.format, self.config)?;
        let path = output_filename(
            &document.id,
            self.options.format.suffix(),
            subdirs,
            self.config,
        );
        self.writer.write(&path, &content)?;
        self.result.files_written += 1;
        Ok(())
    }

    /// Convert the documents of one PubTator stream.
    pub fn convert_stream<R: BufRead>(
        &mut self,
        name: &str,
        reader: R,
        sink: &dyn ProgressSink,
    ) -> Result<(), PubtatorError> {
        let mut documents = PubtatorReader::new(name, reader).with_ids(self.options.ids.clone());
        let mut read = 0usize;
        let mut errors = 0usize;
        for document in documents.by_ref() {
            if self.limit_reached() {
                break;
            }
            let mut document = document?;
            read += 1;
            if read % PROGRESS_INTERVAL == 0 {
                sink.event(ProgressEvent::processed(read));
            }
            if let Some(rng) = self.rng.as_mut() {
                let ratio = self.options.random.unwrap_or(1.0);
                if !rng.gen_bool(ratio) {
                    continue;
                }
            }
            if self.options.segment {
                if let Err(err) = segment(&mut document) {
                    tracing::warn!("not converting {}: {err}", document.id);
                    errors += 1;
                    continue;
                }
            }
            self.write_document(&document)?;
            self.result.converted += 1;
        }
        errors += documents.errors();
        self.result.errors += errors;
        self.result.inputs.push(InputSummary {
            path: name.to_string(),
            documents: read,
            errors,
        });
        sink.event(ProgressEvent {
            message: format!("Completed {name}, processed {read} documents."),
            processed: read,
        });
        Ok(())
    }

    pub fn convert_file(
        &mut self,
        path: &std::path::Path,
        sink: &dyn ProgressSink,
    ) -> Result<(), PubtatorError> {
        let reader = open_input(path)?;
        self.convert_stream(&path.display().to_string(), reader, sink)
    }

    pub fn finish(self) -> ConvertResult {
        self.result
    }
}

/// Convert every input file into `writer`.
pub fn convert_files<W: OutputWriter>(
    inputs: &[PathBuf],
    writer: &mut W,
    options: ConvertOptions,
    config: &ResolvedConfig,
    sink: &dyn ProgressSink,
) -> Result<ConvertResult, PubtatorError> {
    let mut converter = Converter::new(writer, options, config)?;
    for input in inputs {
        if converter.limit_reached() {
            break;
        }
        converter.convert_file(input, sink)?;
    }
    Ok(converter.finish())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;
    use crate::output::JsonOutput;

    #[derive(Default)]
    struct MemoryWriter {
        files: BTreeMap<Utf8PathBuf, String>,
    }

    impl OutputWriter for MemoryWriter {
        fn write(&mut self, relative: &Utf8Path, content: &str) -> Result<(), PubtatorError> {
            self.files.insert(relative.to_path_buf(), content.to_string());
            Ok(())
        }
    }

    const INPUT: &str = "\
10022392|t|Sequence of the gene.
10022392|a|SOD1 binds copper. It is active.
10022392\t22\t26\tSOD1\tGene\t6647

10022393|t|Mice.
10022393\t0\t4\tMice\tSpecies\t10090
";

    fn run(options: ConvertOptions) -> (MemoryWriter, ConvertResult) {
        let config = ResolvedConfig::default();
        let mut writer = MemoryWriter::default();
        let mut converter = Converter::new(&mut writer, options, &config).unwrap();
        converter
            .convert_stream("input", Cursor::new(INPUT), &JsonOutput)
            .unwrap();
        let result = converter.finish();
        (writer, result)
    }

    #[test]
    fn subdirs_use_id_prefix() {
        let (writer, result) = run(ConvertOptions {
            format: OutputFormat::WaJsonld,
            subdirs: true,
            ..ConvertOptions::default()
        });
        assert_eq!(result.converted, 2);
        assert_eq!(result.files_written, 4);
        let paths = writer
            .files
            .keys()
            .map(|path| path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec![
                "1002/10022392.jsonld",
                "1002/10022392.txt",
                "1002/10022393.jsonld",
                "1002/10022393.txt"
            ]
        );
        assert_eq!(
            writer.files[Utf8Path::new("1002/10022393.txt")],
            "Mice.\n"
        );
    }

    #[test]
    fn standoff_without_text() {
        let (writer, _) = run(ConvertOptions {
            no_text: true,
            ..ConvertOptions::default()
        });
        assert_eq!(writer.files.len(), 2);
        assert_eq!(
            writer.files[Utf8Path::new("10022392.ann")],
            "T1\tGene 22 26\tSOD1\nN1\tReference T1 NCBIGENE:6647\tSOD1\n"
        );
    }

    #[test]
    fn segmentation_adds_sentences() {
        let (writer, _) = run(ConvertOptions {
            format: OutputFormat::WaJsonld,
            segment: true,
            no_text: true,
            ..ConvertOptions::default()
        });
        let value: serde_json::Value =
            serde_json::from_str(&writer.files[Utf8Path::new("10022392.jsonld")]).unwrap();
        let types = value
            .as_array()
            .unwrap()
            .iter()
            .map(|object| object["body"]["type"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(types, vec!["Gene", "title", "sentence", "sentence", "sentence"]);
    }

    #[test]
    fn limit_and_sampling() {
        let (_, result) = run(ConvertOptions {
            limit: Some(1),
            ..ConvertOptions::default()
        });
        assert_eq!(result.converted, 1);

        let (_, result) = run(ConvertOptions {
            limit: Some(0),
            ..ConvertOptions::default()
        });
        assert_eq!(result.converted, 2);

        let (_, result) = run(ConvertOptions {
            random: Some(0.0),
            seed: Some(7),
            ..ConvertOptions::default()
        });
        assert_eq!(result.converted, 0);
    }

    #[test]
    fn malformed_documents_fail_the_run() {
        let config = ResolvedConfig::default();
        let mut writer = MemoryWriter::default();
        let mut converter = Converter::new(&mut writer, ConvertOptions::default(), &config).unwrap();
        let input = "1|t|SOD1 binds copper.\n1\tbroken\n\n2|t|Mice.\n";
        converter
            .convert_stream("input", Cursor::new(input), &JsonOutput)
            .unwrap();
        let result = converter.finish();
        assert_eq!(result.converted, 1);
        assert_eq!(result.errors, 1);
        assert_matches!(
            result.into_result(),
            Err(PubtatorError::InvalidDocuments { count: 1 })
        );
        assert!(writer.files.contains_key(Utf8Path::new("2.ann")));
    }

    #[test]
    fn rejects_bad_ratio() {
        let config = ResolvedConfig::default();
        let mut writer = MemoryWriter::default();
        let options = ConvertOptions {
            random: Some(1.5),
            ..ConvertOptions::default()
        };
        assert_matches!(
            Converter::new(&mut writer, options, &config).err(),
            Some(PubtatorError::InvalidRatio(_))
        );
    }
}
