//! `catalink run` and `catalink check`.

use std::path::{Path, PathBuf};

use catalink_recon::evidence::{Diagnostic, Severity};
use catalink_recon::index::audit;
use catalink_recon::table::{read_table_path, table_to_string};
use catalink_recon::{
    CatalogRecord, ExternalLookup, InstitutionRecord, OfflineLookup, PersonRecord, Provenance,
    ReconError, RunReport, SpaceRecord,
};

use crate::exit_codes::{recon_exit_code, ReconErrorOutput, EXIT_RECON_INVARIANT, EXIT_RECON_LOOKUP};
use crate::lookup::HttpLookup;
use crate::settings::{resolve_editor, Settings, EDITOR_ENV};
use crate::{CliError, Kind};

pub struct RunArgs {
    pub kind: Kind,
    pub input: PathBuf,
    pub catalog: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub editor: Option<String>,
    pub date: Option<String>,
    pub json: bool,
    pub offline: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    if args.json && args.output.is_none() {
        return Err(CliError::args("--json prints the run report on stdout; the table needs --output")
            .with_hint("catalink run --kind person --input local.csv --catalog catalog.csv -o out.csv --json"));
    }

    match args.kind {
        Kind::Person => run_kind::<PersonRecord>(&args),
        Kind::Institution => run_kind::<InstitutionRecord>(&args),
        Kind::Space => run_kind::<SpaceRecord>(&args),
    }
}

fn run_kind<R: CatalogRecord>(args: &RunArgs) -> Result<(), CliError> {
    let settings = Settings::load(args.config.as_deref())?;
    let editor = resolve_editor(
        args.editor.as_deref(),
        settings.recon.editor.as_deref(),
        std::env::var(EDITOR_ENV).ok(),
    )?;
    let provenance = match &args.date {
        Some(date) => Provenance::new(parse_date(date)?, editor),
        None => Provenance::today(editor),
    };

    let catalog: Vec<R> = read_table(&args.catalog)?;
    let rows: Vec<R> = read_table(&args.input)?;
    tracing::info!(
        kind = %R::KIND,
        catalog = catalog.len(),
        rows = rows.len(),
        offline = args.offline,
        "reconciling"
    );

    let http = if args.offline {
        None
    } else {
        let language = settings.recon.languages.first().map(String::as_str).unwrap_or("en");
        let http = HttpLookup::from_settings(&settings.lookup, language).map_err(|e| CliError {
            code: EXIT_RECON_LOOKUP,
            message: e.to_string(),
            hint: None,
        })?;
        Some(http)
    };
    let lookup: &dyn ExternalLookup = match &http {
        Some(http) => http,
        None => &OfflineLookup,
    };

    let result = catalink_recon::run(&settings.recon, &catalog, rows, lookup, &provenance);
    if let Some(http) = &http {
        http.log_usage();
    }
    let report = match result {
        Ok(report) => report,
        Err(err) => return Err(abort(&err, args.json)),
    };

    replay_diagnostics(&report.diagnostics);

    let table = table_to_string(&report.rows).map_err(|e| CliError::io(e.to_string()))?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &table)
                .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
            tracing::info!(path = %path.display(), rows = report.rows.len(), "wrote table");
        }
        None => print!("{table}"),
    }

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::internal(format!("JSON serialization error: {e}")))?;
        println!("{json}");
    } else {
        print_summary(&report);
    }

    Ok(())
}

/// Report a fatal engine error. Nothing is written.
fn abort(err: &ReconError, json: bool) -> CliError {
    let output = ReconErrorOutput::from_recon_error(err);
    if json {
        output.print(true);
        // already reported as JSON
        return CliError { code: recon_exit_code(err), message: String::new(), hint: None };
    }
    let hint = match err {
        ReconError::ExternalIdConflict { .. } | ReconError::KnownRecordConflict { .. } => {
            Some("fix the row or the catalog and rerun; no output was written".to_string())
        }
        ReconError::MissingPrerequisite { .. } => {
            Some("the catalog needs at least one local ID ending in digits".to_string())
        }
        ReconError::Lookup { .. } => Some("retry later or run with --offline".to_string()),
        _ => None,
    };
    CliError { code: recon_exit_code(err), message: output.message, hint }
}

fn replay_diagnostics(diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        match d.severity {
            Severity::Debug => tracing::debug!(row = d.row, "{}", d.message),
            Severity::Info => tracing::info!(row = d.row, "{}", d.message),
            Severity::Warning => tracing::warn!(row = d.row, "{}", d.message),
        }
    }
}

fn print_summary<R>(report: &RunReport<R>) {
    let s = &report.summary;
    eprintln!(
        "{} reconcile: {} rows, {} matched, {} unmatched, {} modified, {} unchanged, {} skipped",
        report.meta.kind, s.total_rows, s.matched, s.unmatched, s.modified, s.unchanged, s.skipped,
    );
    if s.allocated > 0 {
        eprintln!("allocated {} new local ID(s)", s.allocated);
    }
}

fn parse_date(value: &str) -> Result<String, CliError> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.to_string())
        .map_err(|e| CliError::args(format!("invalid --date '{value}': {e}")).with_hint("expected YYYY-MM-DD"))
}

fn read_table<R: CatalogRecord>(path: &Path) -> Result<Vec<R>, CliError> {
    read_table_path(path).map_err(|e| CliError {
        code: recon_exit_code(&e),
        message: e.to_string(),
        hint: None,
    })
}

// ============================================================================
// check
// ============================================================================

pub fn cmd_check(kind: Kind, file: PathBuf, json: bool) -> Result<(), CliError> {
    match kind {
        Kind::Person => check_kind::<PersonRecord>(&file, json),
        Kind::Institution => check_kind::<InstitutionRecord>(&file, json),
        Kind::Space => check_kind::<SpaceRecord>(&file, json),
    }
}

fn check_kind<R: CatalogRecord>(file: &Path, json: bool) -> Result<(), CliError> {
    let rows: Vec<R> = read_table(file)?;
    let violations = audit(&rows);

    if json {
        let out = serde_json::json!({
            "file": file.display().to_string(),
            "rows": rows.len(),
            "violations": violations,
        });
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::internal(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    } else {
        for v in &violations {
            println!("{v}");
        }
    }

    if violations.is_empty() {
        eprintln!("{}: {} rows, ok", file.display(), rows.len());
        Ok(())
    } else {
        Err(CliError {
            code: EXIT_RECON_INVARIANT,
            message: format!("{}: {} violation(s)", file.display(), violations.len()),
            hint: None,
        })
    }
}
