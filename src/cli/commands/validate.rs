//! `chemrec validate` command - check a submission against its baseline

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{format_short_id, load, load_config, load_rules, truncate_str};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::core::engine::{ReconciliationEngine, ValidationReport};
use crate::core::lifecycle::IncidentLedger;
use crate::entities::baseline::Baseline;
use crate::entities::finding::{FindingKind, Severity};
use crate::entities::submission::Submission;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Attribute rule set
    #[arg(long, short = 'r')]
    pub rules: PathBuf,

    /// Baseline snapshot to compare against
    #[arg(long, short = 'b')]
    pub baseline: PathBuf,

    /// Submission to validate
    #[arg(long, short = 's')]
    pub submission: PathBuf,

    /// Previous version of the same submission (adds version-comparison findings)
    #[arg(long)]
    pub previous: Option<PathBuf>,

    /// Incident ledger; new incidents are appended and the file rewritten
    #[arg(long, short = 'i')]
    pub incidents: Option<PathBuf>,

    /// Exit with an error when any CRITICAL finding is reported
    #[arg(long)]
    pub strict: bool,
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let rules = load_rules(&args.rules)?;
    let config = load_config(global.config.as_deref())?;
    let baseline: Baseline = load(&args.baseline)?;
    let submission: Submission = load(&args.submission)?;
    let previous = args
        .previous
        .as_deref()
        .map(load::<Submission>)
        .transpose()?;

    let mut ledger = match &args.incidents {
        Some(path) => IncidentLedger::load(path).map_err(|e| miette::miette!("{}", e))?,
        None => IncidentLedger::new(),
    };

    let engine = ReconciliationEngine::new(rules, config);
    let report = engine
        .validate_against(&submission, &baseline, previous.as_ref(), &mut ledger)
        .map_err(|e| miette::miette!("{}", e))?;

    if let Some(path) = &args.incidents {
        ledger.save(path).map_err(|e| miette::miette!("{}", e))?;
    }

    if !emit(&report, Some(&report.submission), global.format)? {
        print_report(&report);
    }

    if args.strict && report.summary.critical > 0 {
        return Err(miette::miette!(
            "{} critical deviation(s) in submission {}",
            report.summary.critical,
            report.submission
        ));
    }
    Ok(())
}

fn severity_label(severity: Severity) -> String {
    match severity {
        Severity::Critical => style("CRITICAL").red().bold().to_string(),
        Severity::Warning => style("WARNING").yellow().to_string(),
        Severity::Info => style("INFO").dim().to_string(),
    }
}

fn print_report(report: &ValidationReport) {
    println!(
        "{} Validated {} against baseline v{}\n",
        style("→").blue(),
        style(format_short_id(&report.submission)).cyan(),
        report.baseline_version
    );

    for f in &report.findings {
        let deviation = f
            .deviation_percent
            .map(|d| format!(" ({:.2}%)", d))
            .unwrap_or_default();
        let tag = match f.kind {
            FindingKind::Baseline => "",
            FindingKind::VersionComparison => " [version]",
            FindingKind::InputError => " [input]",
        };
        println!(
            "  {:<10} {:<28} {} → {}{}{}",
            severity_label(f.severity),
            truncate_str(f.attribute_key.as_str(), 28),
            f.expected,
            f.actual,
            deviation,
            style(tag).dim()
        );
    }
    if report.findings.is_empty() {
        println!("  {} No deviations", style("✓").green());
    }

    let s = &report.summary;
    println!();
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "Critical: {}  Warning: {}  Info: {}  Input errors: {}  Version changes: {}",
        style(s.critical).red(),
        style(s.warning).yellow(),
        s.info,
        s.input_errors,
        s.version_changes
    );
    for event in &report.incidents_opened {
        println!(
            "{} Opened incident {}",
            style("!").red(),
            style(event.incident_id).cyan()
        );
    }
    if report.can_advance {
        println!("{} Submission may advance past review", style("✓").green());
    } else {
        println!(
            "{} Submission is held in review by open incidents",
            style("✗").red()
        );
    }
}
