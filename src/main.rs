use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use annotation_consensus::{
    exporter, AnnotationHistory, ConsensusConfig, ConsensusEngine, ConsolePrompt,
    InteractiveAdjudicator, MultiSourceMerge, RecordStore, Session, SessionOutcome, WritePolicy,
};

/// Reconcile tweet annotations into a gold-standard label set
#[derive(Parser, Debug)]
#[command(name = "annotation-consensus")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Field separator for every file read or written ("tab" or one character)
    #[arg(long, global = true, default_value = "tab", value_parser = parse_delimiter)]
    delimiter: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Vote on every item across annotator files and adjudicate the rest
    Reconcile {
        /// One file per annotator
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Previously exported files used to seed the label history
        #[arg(long = "history", value_name = "FILE")]
        history: Vec<PathBuf>,

        /// Output file (default: gold-<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only apply history, leave everything else marked "?"
        #[arg(long)]
        no_interactive: bool,

        #[command(flatten)]
        thresholds: Thresholds,
    },

    /// Label the unresolved rows of one file, saving it in place
    Annotate {
        input: PathBuf,

        /// Previously exported files used to seed the label history
        #[arg(long = "history", value_name = "FILE")]
        history: Vec<PathBuf>,

        /// Write here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge annotator files into one row per item with per-annotator columns
    Combine {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(short, long, default_value = annotation_consensus::merge::COMBINED_FILE)]
        output: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct Thresholds {
    /// Number of annotators (max votes per item)
    #[arg(long, default_value = "4", env = "ANNOTATION_ANNOTATORS")]
    annotators: usize,

    /// Votes needed for a majority (default: annotators / 2 + 1)
    #[arg(long, env = "ANNOTATION_MAJORITY")]
    majority: Option<usize>,

    /// Votes needed for full agreement (default: annotators)
    #[arg(long, env = "ANNOTATION_FULL_AGREE")]
    full_agree: Option<usize>,
}

impl Thresholds {
    fn config(&self) -> ConsensusConfig {
        let mut config = ConsensusConfig::for_annotators(self.annotators);
        if let Some(majority) = self.majority {
            config.majority_threshold = majority;
        }
        if let Some(full_agree) = self.full_agree {
            config.full_agree_threshold = full_agree;
        }
        config
    }
}

fn parse_delimiter(value: &str) -> std::result::Result<u8, String> {
    match value {
        "tab" | "\\t" | "\t" => Ok(b'\t'),
        _ if value.len() == 1 && value.is_ascii() => Ok(value.as_bytes()[0]),
        _ => Err(format!("expected \"tab\" or a single ASCII character, got {:?}", value)),
    }
}

fn main() -> ExitCode {
    // Logs go to stderr so they never interleave with prompts
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "annotation_consensus=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("❌ {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Ok(false) means a contained fault: progress was saved, exit non-zero
fn run(args: Args) -> Result<bool> {
    let delimiter = args.delimiter;
    match args.command {
        Command::Reconcile {
            files,
            history,
            output,
            no_interactive,
            thresholds,
        } => {
            let output = output.unwrap_or_else(|| exporter::timestamped_output(Path::new("."), Local::now()));
            run_reconcile(&files, &history, &output, no_interactive, thresholds.config(), delimiter)
        }
        Command::Annotate {
            input,
            history,
            output,
        } => {
            let output = output.unwrap_or_else(|| input.clone());
            run_annotate(&input, &history, &output, delimiter)
        }
        Command::Combine { files, output } => {
            run_combine(&files, &output, delimiter)?;
            Ok(true)
        }
    }
}

fn replay_history(history: &mut AnnotationHistory, files: &[PathBuf], delimiter: u8) -> Result<()> {
    for file in files {
        history
            .replay(file, delimiter)
            .with_context(|| format!("Failed to replay history file {}", file.display()))?;
    }
    Ok(())
}

fn run_reconcile(
    files: &[PathBuf],
    history_files: &[PathBuf],
    output: &Path,
    no_interactive: bool,
    config: ConsensusConfig,
    delimiter: u8,
) -> Result<bool> {
    let engine = ConsensusEngine::new(config).context("Invalid thresholds")?;

    println!("### Reading Files ###");
    let mut store = RecordStore::new(config.annotator_count).with_delimiter(delimiter);
    for file in files {
        let rows = store
            .ingest(file)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        println!("✓ {} ({} rows)", file.display(), rows);
    }

    let mut history = AnnotationHistory::new(WritePolicy::FirstWriteWins);
    replay_history(&mut history, history_files, delimiter)?;

    let mut session = Session::from_store(store, history);

    println!("### Comparing Annotations ###");
    session.apply_consensus(&engine);

    println!("### Data Statistics ###");
    println!("{}", session.stats().report());

    let outcome = if no_interactive {
        let filled = session.propagate_from_history();
        info!(filled, "applied history without prompting");
        SessionOutcome::Completed
    } else {
        println!("### Started Manual Annotating ###");
        let mut adjudicator = InteractiveAdjudicator::new(ConsolePrompt::stdio());
        session.adjudicate(&mut adjudicator)
    };

    finish(&session, outcome, output, delimiter)
}

fn run_annotate(input: &Path, history_files: &[PathBuf], output: &Path, delimiter: u8) -> Result<bool> {
    let items = exporter::read_items(input, delimiter)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let mut history = AnnotationHistory::new(WritePolicy::LastWriteWins);
    replay_history(&mut history, history_files, delimiter)?;

    let mut session = Session::from_items(items, history)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    let seeded = session.seed_history_from_items();
    info!(seeded, pending = session.pending_count(), "input loaded");

    let mut adjudicator = InteractiveAdjudicator::new(ConsolePrompt::stdio());
    let outcome = session.adjudicate(&mut adjudicator);

    finish(&session, outcome, output, delimiter)
}

/// The single save-and-exit path for completion, stop and fault
fn finish(session: &Session, outcome: SessionOutcome, output: &Path, delimiter: u8) -> Result<bool> {
    println!("### Saving File ###");
    session
        .save(output, delimiter)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    println!("✓ Saved {} ({} still open)", output.display(), session.pending_count());

    match outcome {
        SessionOutcome::Completed => {
            println!("done!");
            Ok(true)
        }
        SessionOutcome::Stopped => {
            println!("stopped, progress saved");
            Ok(true)
        }
        SessionOutcome::Faulted(err) => {
            eprintln!("### Err:");
            eprintln!("{}", err);
            Ok(false)
        }
    }
}

fn run_combine(files: &[PathBuf], output: &Path, delimiter: u8) -> Result<()> {
    if files.is_empty() {
        bail!("No input files given");
    }
    let mut merge = MultiSourceMerge::new(delimiter);
    for (n, file) in files.iter().enumerate() {
        println!("loading {} {}", file.display(), n);
        merge
            .add_file(file)
            .with_context(|| format!("Failed to load {}", file.display()))?;
    }
    println!("writing");
    merge.write(output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(","), Ok(b','));
        assert!(parse_delimiter("::").is_err());
    }

    #[test]
    fn test_threshold_overrides() {
        let args = Args::parse_from(["annotation-consensus", "reconcile", "a.tsv", "b.tsv", "c.tsv", "--annotators", "3"]);
        match args.command {
            Command::Reconcile { thresholds, files, .. } => {
                assert_eq!(files.len(), 3);
                let config = thresholds.config();
                assert_eq!(config.majority_threshold, 2);
                assert_eq!(config.full_agree_threshold, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    fn one_item_session() -> Session {
        let items = vec![annotation_consensus::Item::new("1", "hello")];
        Session::from_items(items, AnnotationHistory::new(WritePolicy::LastWriteWins)).unwrap()
    }

    #[test]
    fn test_finish_after_stop_saves_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("gold.csv");
        let ok = finish(&one_item_session(), SessionOutcome::Stopped, &out, b'\t').unwrap();
        assert!(ok);
        assert!(out.exists());
    }

    #[test]
    fn test_finish_after_fault_saves_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("gold.csv");
        let fault = SessionOutcome::Faulted(annotation_consensus::ConsensusError::ItemFault {
            item_id: "1".to_string(),
            message: "prompt closed".to_string(),
        });
        let ok = finish(&one_item_session(), fault, &out, b'\t').unwrap();
        assert!(!ok);
        assert_eq!(exporter::read_items(&out, b'\t').unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_bad_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a1.tsv");
        let bad = dir.path().join("a2.tsv");
        std::fs::write(&good, "id\ttext\texplicitness\ttarget\n1\thi\tNOT\t\n").unwrap();
        std::fs::write(&bad, "id\ttext\texplicitness\n1\thi\tNOT\n").unwrap();
        let out = dir.path().join("gold.csv");

        let result = run_reconcile(&[good, bad], &[], &out, true, ConsensusConfig::default(), b'\t');
        assert!(result.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_reconcile_invalid_thresholds_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a1.tsv");
        std::fs::write(&source, "id\ttext\texplicitness\ttarget\n1\thi\tNOT\t\n").unwrap();
        let out = dir.path().join("gold.csv");
        let config = ConsensusConfig {
            annotator_count: 2,
            full_agree_threshold: 2,
            majority_threshold: 3,
        };

        let result = run_reconcile(&[source], &[], &out, true, config, b'\t');
        assert!(result.is_err());
        assert!(!out.exists());
    }
}
