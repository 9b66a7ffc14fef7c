//! `apply` command implementation.

use anyhow::{Context, Result};
use huddle_core::{
    apply_document, apply_document_atomically, open_db, ActionOutcome, Document, ExecutorConfig,
    RunFailure,
};
use log::info;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct ApplyArgs {
    pub file: PathBuf,
    pub db: PathBuf,
    pub tz: Option<String>,
    pub atomic: bool,
    pub json: bool,
}

pub fn execute(args: ApplyArgs) -> Result<()> {
    let doc = read_document(&args.file)?;
    info!(
        "event=apply module=cli status=start file={} db={} actions={} atomic={}",
        args.file.display(),
        args.db.display(),
        doc.actions.len(),
        args.atomic
    );

    let mut conn = open_db(&args.db)
        .with_context(|| format!("failed to open store {}", args.db.display()))?;
    let mut config = ExecutorConfig::new();
    if let Some(tz) = args.tz {
        config = config.with_default_zone(tz);
    }

    let mut out = io::stdout().lock();
    // JSON mode carries candidates inside the outcomes instead.
    let mut sink = io::sink();
    let candidate_output: &mut dyn Write = if args.json { &mut sink } else { &mut out };

    let result = if args.atomic {
        apply_document_atomically(&mut conn, &doc, &config, candidate_output)
    } else {
        apply_document(&conn, &doc, &config, candidate_output)
    };

    match result {
        Ok(outcomes) => {
            print_outcomes(&mut out, &outcomes, args.json)?;
            Ok(())
        }
        Err(failure) => {
            report_failure(&mut out, &failure, args.json)?;
            Err(anyhow::Error::new(failure)).context("apply failed")
        }
    }
}

fn read_document(path: &Path) -> Result<Document> {
    if path.as_os_str() == "-" {
        return Document::from_reader(io::stdin().lock())
            .context("failed to read document from stdin");
    }
    let file =
        File::open(path).with_context(|| format!("failed to open document {}", path.display()))?;
    Document::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to read document {}", path.display()))
}

fn print_outcomes(out: &mut impl Write, outcomes: &[ActionOutcome], json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, outcomes)?;
        writeln!(out)?;
        return Ok(());
    }
    for outcome in outcomes {
        writeln!(out, "{}", outcome_line(outcome))?;
    }
    Ok(())
}

fn report_failure(out: &mut impl Write, failure: &RunFailure, json: bool) -> Result<()> {
    if json {
        let report = serde_json::json!({
            "completed": failure.completed,
            "failed": {
                "action_id": failure.action_id,
                "kind": failure.kind,
                "error": failure.error.to_string(),
            },
            "rolled_back": failure.rolled_back,
        });
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    for outcome in &failure.completed {
        writeln!(out, "{}", outcome_line(outcome))?;
    }
    writeln!(
        out,
        "{} {}: FAILED: {}",
        display_id(&failure.action_id),
        failure.kind,
        failure.error
    )?;
    if failure.rolled_back && !failure.completed.is_empty() {
        writeln!(out, "rolled back {} completed action(s)", failure.completed.len())?;
    }
    Ok(())
}

fn outcome_line(outcome: &ActionOutcome) -> String {
    format!(
        "{} {}: {}",
        display_id(&outcome.action_id),
        outcome.kind,
        outcome.summary
    )
}

fn display_id(id: &str) -> &str {
    if id.is_empty() {
        "-"
    } else {
        id
    }
}
