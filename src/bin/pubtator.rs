use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use pubtator_tools::app::process_files;
use pubtator_tools::config::{ConfigLoader, ResolvedConfig};
use pubtator_tools::convert::{ConvertOptions, DEFAULT_OUTPUT_DIR, FilesystemWriter, convert_files};
use pubtator_tools::cooccurrence::{self, CoocOptions};
use pubtator_tools::domain::OutputFormat;
use pubtator_tools::error::PubtatorError;
use pubtator_tools::fs_util::{WalkOptions, collect_files, open_input, read_id_list};
use pubtator_tools::idmap::{DEFAULT_PREFIX, IdMapper, read_mapping};
use pubtator_tools::listing::{IdLister, filter_pubtator};
use pubtator_tools::mappings::{
    MappingOptions, MappingStatistics, Mappings, best, collect_file, filter_mappings, invert,
    read_mappings, related_pairs,
};
use pubtator_tools::merge::{MergeOptions, Merger};
use pubtator_tools::output::{JsonOutput, LogProgress};

const DEFAULT_SUFFIX: &str = ".jsonld";

#[derive(Parser)]
#[command(name = "pubtator")]
#[command(about = "Convert PubTator corpora and post-process the converted annotations")]
#[command(version)]
struct Cli {
    /// Log progress and statistics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON configuration file (default: ./pubtator.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Convert PubTator files to standoff, JSON or JSON-LD")]
    Convert(ConvertArgs),
    #[command(about = "Convert PubTator files to standoff (convert -f standoff)")]
    ToStandoff(ConvertCommon),
    #[command(about = "Add co-occurrence relations to converted JSON-LD files")]
    AddCooc(CoocArgs),
    #[command(about = "Rewrite ids in JSON files through a mapping table")]
    MapIds(MapIdsArgs),
    #[command(about = "Report mention text to id mappings")]
    GetMappings(GetMappingsArgs),
    #[command(about = "Invert text to id mappings into id to text mappings")]
    InvertMappings(MappingFilesArgs),
    #[command(about = "Keep the most frequent value of each mapping")]
    BestMapping(MappingFilesArgs),
    #[command(about = "Print the entity pairs of each relation")]
    Related(RelatedArgs),
    #[command(about = "Merge parallel annotation files or directories")]
    Merge(MergeArgs),
    #[command(about = "List the document ids of PubTator files")]
    ListIds(ListIdsArgs),
    #[command(about = "Filter PubTator files to listed document ids")]
    Filter(FilterArgs),
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Standoff)]
    format: OutputFormat,

    #[command(flatten)]
    common: ConvertCommon,
}

#[derive(Args)]
struct ConvertCommon {
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: String,

    /// Place files in per-document-prefix subdirectories
    #[arg(short, long)]
    subdirs: bool,

    /// Add sentence segmentation annotations (also -ss)
    #[arg(long)]
    segment: bool,

    /// Do not write .txt files
    #[arg(short, long)]
    no_text: bool,

    /// Only convert documents listed in FILE
    #[arg(short, long, value_name = "FILE")]
    ids: Option<PathBuf>,

    /// Maximum number of documents to convert (0 for no limit)
    #[arg(short, long, value_name = "INT")]
    limit: Option<usize>,

    /// Sample documents with probability R
    #[arg(short, long, value_name = "R")]
    random: Option<f64>,

    /// Seed for --random
    #[arg(long)]
    seed: Option<u64>,

    /// Succeed even when some documents could not be read
    #[arg(long)]
    allow_errors: bool,

    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct CoocArgs {
    /// Character distance-based co-occurrence (default sentence)
    #[arg(short, long, value_name = "CHARS")]
    distance: Option<usize>,

    /// Include repeated entity co-occurrences in context
    #[arg(short = 'p', long)]
    include_repeated: bool,

    #[arg(short, long)]
    recurse: bool,

    /// Include co-occurrences of entities with themselves
    #[arg(short = 's', long)]
    include_self: bool,

    /// Suffix of files to process (with -r)
    #[arg(short = 'S', long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct MapIdsArgs {
    /// Namespace prefix of ids to map (empty maps all)
    #[arg(short, long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    #[arg(short, long)]
    recurse: bool,

    /// Suffix of files to process (with -r)
    #[arg(short, long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    #[arg(value_name = "MAPFILE")]
    mapping: PathBuf,

    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct GetMappingsArgs {
    /// Include sentence-level hallmark annotations
    #[arg(short, long)]
    all: bool,

    /// Minimum occurrence count for included mappings
    #[arg(short = 'c', long, default_value_t = 0)]
    min_count: u64,

    #[arg(short, long)]
    recurse: bool,

    /// Minimum ratio to the most frequent id for included mappings
    #[arg(short = 'R', long, default_value_t = 0.0)]
    min_ratio: f64,

    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct MappingFilesArgs {
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct RelatedArgs {
    #[arg(short, long)]
    recurse: bool,

    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct MergeArgs {
    /// Output directory (default stdout)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    #[arg(short, long)]
    recurse: bool,

    /// Suffix of files to merge
    #[arg(short, long, default_value = DEFAULT_SUFFIX)]
    suffix: String,

    /// Merge files missing from some directories too
    #[arg(short, long)]
    union: bool,

    #[arg(required = true, num_args = 2.., value_name = "PATH")]
    paths: Vec<PathBuf>,
}

#[derive(Args)]
struct ListIdsArgs {
    /// Maximum number of ids to output (0 for no limit)
    #[arg(short, long, value_name = "INT")]
    limit: Option<usize>,

    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(value_name = "IDFILE")]
    ids: PathBuf,

    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PubtatorError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PubtatorError) -> u8 {
    match error {
        PubtatorError::Filesystem(_) | PubtatorError::ConfigRead(_) => 3,
        PubtatorError::FilesFailed { .. } => 1,
        PubtatorError::Parse { .. }
        | PubtatorError::InvalidNorm { .. }
        | PubtatorError::InvalidTaxonomyId(_)
        | PubtatorError::InvalidDocuments { .. }
        | PubtatorError::TitleMismatch(_)
        | PubtatorError::InvalidRatio(_)
        | PubtatorError::MissingConfig(_)
        | PubtatorError::ConfigParse(_)
        | PubtatorError::Json { .. }
        | PubtatorError::DuplicateAnnotationId { .. }
        | PubtatorError::UnsupportedAnnotation(_)
        | PubtatorError::UnsupportedFile(_)
        | PubtatorError::InvalidFragment(_)
        | PubtatorError::CrossDocument(..)
        | PubtatorError::MappingFormat { .. }
        | PubtatorError::DanglingRelation { .. }
        | PubtatorError::Merge(_) => 2,
    }
}

/// `-ss` is the conventional short form of `--segment`.
fn normalize_args(args: impl Iterator<Item = OsString>) -> Vec<OsString> {
    args.map(|arg| {
        if arg == "-ss" {
            OsString::from("--segment")
        } else {
            arg
        }
    })
    .collect()
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert(args) => {
            let config = ConfigLoader::resolve(cli.config.as_deref())?;
            run_convert(args.common, args.format, &config)
        }
        Commands::ToStandoff(args) => {
            let config = ConfigLoader::resolve(cli.config.as_deref())?;
            run_convert(args, OutputFormat::Standoff, &config)
        }
        Commands::AddCooc(args) => run_add_cooc(args),
        Commands::MapIds(args) => run_map_ids(args),
        Commands::GetMappings(args) => run_get_mappings(args),
        Commands::InvertMappings(args) => {
            for file in &args.files {
                JsonOutput::print(&invert(&read_mappings(file)?)).into_diagnostic()?;
            }
            Ok(())
        }
        Commands::BestMapping(args) => {
            for file in &args.files {
                JsonOutput::print(&best(&read_mappings(file)?)).into_diagnostic()?;
            }
            Ok(())
        }
        Commands::Related(args) => run_related(args),
        Commands::Merge(args) => run_merge(args),
        Commands::ListIds(args) => run_list_ids(args),
        Commands::Filter(args) => run_filter(args),
    }
}

fn run_convert(
    args: ConvertCommon,
    format: OutputFormat,
    config: &ResolvedConfig,
) -> miette::Result<()> {
    let ids = args.ids.as_deref().map(read_id_list).transpose()?;
    let options = ConvertOptions {
        format,
        subdirs: args.subdirs,
        segment: args.segment,
        no_text: args.no_text,
        ids,
        limit: args.limit,
        random: args.random,
        seed: args.seed,
    };
    let mut writer = FilesystemWriter::new(Utf8PathBuf::from(args.output));
    let result = convert_files(&args.files, &mut writer, options, config, &LogProgress)?;
    tracing::info!(
        "Done, converted {} documents into {} ({} files, {} errors).",
        result.converted,
        writer.base_dir(),
        result.files_written,
        result.errors
    );
    if args.allow_errors {
        if result.errors > 0 {
            tracing::warn!("{} document(s) could not be read", result.errors);
        }
        return Ok(());
    }
    result.into_result()?;
    Ok(())
}

fn run_add_cooc(args: CoocArgs) -> miette::Result<()> {
    let files = collect_files(
        &args.paths,
        &WalkOptions {
            recurse: args.recurse,
            suffix: args.suffix,
        },
    )?;
    let options = CoocOptions {
        distance: args.distance,
        include_self: args.include_self,
        include_repeated: args.include_repeated,
    };
    process_files(&files, &LogProgress, |path| {
        cooccurrence::process_file(path, &options).map(|_| ())
    })
    .into_result()?;
    Ok(())
}

fn run_map_ids(args: MapIdsArgs) -> miette::Result<()> {
    let mapping = read_mapping(&args.mapping)?;
    let files = collect_files(
        &args.paths,
        &WalkOptions {
            recurse: args.recurse,
            suffix: args.suffix,
        },
    )?;
    let mut mapper = IdMapper::new(mapping, Some(args.prefix));
    let result = process_files(&files, &LogProgress, |path| mapper.map_file_ids(path));
    writeln!(io::stderr(), "{}", mapper.stats()).into_diagnostic()?;
    result.into_result()?;
    Ok(())
}

fn run_get_mappings(args: GetMappingsArgs) -> miette::Result<()> {
    let files = collect_files(
        &args.paths,
        &WalkOptions {
            recurse: args.recurse,
            suffix: DEFAULT_SUFFIX.to_string(),
        },
    )?;
    let options = MappingOptions {
        all: args.all,
        min_count: args.min_count,
        min_ratio: args.min_ratio,
    };
    let mut mappings = Mappings::new();
    process_files(&files, &LogProgress, |path| {
        collect_file(path, &options, &mut mappings)
    })
    .into_result()?;
    filter_mappings(&mut mappings, options.min_count, options.min_ratio);
    MappingStatistics::of(&mappings)
        .write_to(&mut io::stderr().lock())
        .into_diagnostic()?;
    JsonOutput::print(&mappings).into_diagnostic()?;
    Ok(())
}

fn run_related(args: RelatedArgs) -> miette::Result<()> {
    let files = collect_files(
        &args.paths,
        &WalkOptions {
            recurse: args.recurse,
            suffix: DEFAULT_SUFFIX.to_string(),
        },
    )?;
    let mut stdout = io::stdout().lock();
    process_files(&files, &LogProgress, |path| {
        for (first, second) in related_pairs(path)? {
            writeln!(stdout, "{first}\t{second}")
                .map_err(|err| PubtatorError::Filesystem(err.to_string()))?;
        }
        Ok(())
    })
    .into_result()?;
    Ok(())
}

fn run_merge(args: MergeArgs) -> miette::Result<()> {
    let options = MergeOptions {
        output: args.output,
        recurse: args.recurse,
        suffix: args.suffix,
        union: args.union,
    };
    let mut merger = Merger::new(options, io::stdout().lock());
    merger.merge(&args.paths)?;
    tracing::info!("Done, merged {} files.", merger.merged());
    Ok(())
}

fn run_list_ids(args: ListIdsArgs) -> miette::Result<()> {
    let mut lister = IdLister::new(io::stdout().lock(), args.limit);
    for file in &args.files {
        let reader = open_input(file)?;
        lister.list_stream(&file.display().to_string(), reader, &LogProgress)?;
    }
    Ok(())
}

fn run_filter(args: FilterArgs) -> miette::Result<()> {
    let ids = read_id_list(&args.ids)?;
    let mut stdout = io::stdout().lock();
    for file in &args.files {
        let reader = open_input(file)?;
        filter_pubtator(reader, &ids, &mut stdout, &LogProgress)?;
    }
    Ok(())
}
