//! `chemrec diff`, `merge` and `intake` commands - composition reconciliation

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{format_short_id, load, load_config, save};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::core::entity::summary_line;
use crate::core::reconcile::{ComponentChange, ComponentReconciler, DiffResult};
use crate::entities::composition::{CompositionRecord, ExtractionBatch, MergeStrategy};

#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    /// Base composition record
    pub base: PathBuf,

    /// Candidate composition record
    pub candidate: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    /// Composition records to merge (two or more)
    #[arg(num_args = 2.., required = true)]
    pub records: Vec<PathBuf>,

    /// Per-record weights summing to 1.0 (default: equal weights)
    #[arg(long, short = 'w', value_delimiter = ',')]
    pub weights: Option<Vec<f64>>,

    /// Label for the merged record
    #[arg(long)]
    pub label: Option<String>,

    /// Write the merged record to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct IntakeArgs {
    /// Extraction batch (YAML or JSON)
    pub batch: PathBuf,

    /// Product the extracted document belongs to
    #[arg(long, short = 'p')]
    pub product: String,

    /// Label for the record (e.g. document name)
    #[arg(long)]
    pub label: Option<String>,

    /// Write the composition record to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

fn reconciler(global: &GlobalOpts) -> Result<ComponentReconciler> {
    Ok(ComponentReconciler::new(&load_config(global.config.as_deref())?))
}

pub fn run_diff(args: DiffArgs, global: &GlobalOpts) -> Result<()> {
    let base: CompositionRecord = load(&args.base)?;
    let candidate: CompositionRecord = load(&args.candidate)?;

    let diff = reconciler(global)?
        .diff(&base, &candidate)
        .map_err(|e| miette::miette!("{}", e))?;

    if !emit(&diff, None, global.format)? {
        print_diff(&diff);
    }
    Ok(())
}

pub fn run_merge(args: MergeArgs, global: &GlobalOpts) -> Result<()> {
    let records = args
        .records
        .iter()
        .map(|p| load::<CompositionRecord>(p))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&CompositionRecord> = records.iter().collect();

    let strategy = match args.weights {
        Some(weights) => MergeStrategy::Weighted { weights },
        None => MergeStrategy::EqualWeight,
    };

    let mut merged = reconciler(global)?
        .merge_all(&refs, strategy)
        .map_err(|e| miette::miette!("{}", e))?;
    if args.label.is_some() {
        merged.label = args.label;
    }

    if let Some(path) = &args.output {
        save(path, &merged)?;
    }

    if !emit(&merged, Some(&merged.id), global.format)? {
        println!(
            "{} Merged {} records into {}",
            style("✓").green(),
            records.len(),
            style(format_short_id(&merged.id)).cyan()
        );
        print_record(&merged);
    }
    Ok(())
}

pub fn run_intake(args: IntakeArgs, global: &GlobalOpts) -> Result<()> {
    let batch: ExtractionBatch = load(&args.batch)?;
    let config = load_config(global.config.as_deref())?;

    let mut record = batch.into_record(args.product);
    record.label = args.label;

    if let Some(path) = &args.output {
        save(path, &record)?;
    }

    if !emit(&record, Some(&record.id), global.format)? {
        println!(
            "{} Composition record {} for {}",
            style("✓").green(),
            style(format_short_id(&record.id)).cyan(),
            style(&record.product).yellow()
        );
        if record
            .confidence
            .is_some_and(|c| c < config.low_confidence_threshold)
        {
            println!(
                "{} Low extraction confidence ({:.0}%); match scores against this record are downgraded",
                style("!").yellow(),
                record.confidence.unwrap_or_default()
            );
        }
        print_record(&record);
    }
    Ok(())
}

fn print_record(record: &CompositionRecord) {
    println!("  {}", style(summary_line(record)).dim());
    println!("{}", style("─".repeat(60)).dim());
    for line in &record.lines {
        println!(
            "  {:<16} {:<30} {:>8.3}%",
            line.identifier().unwrap_or("-"),
            line.name,
            line.percentage
        );
    }
    println!("{}", style("─".repeat(60)).dim());
    let total = record.total_percentage();
    let total_text = format!("{:.3}%", total);
    let total_styled = if record.sum_deviation() > 0.01 {
        style(total_text).yellow()
    } else {
        style(total_text).green()
    };
    println!("  {:<47} {:>9}", "Total", total_styled);
}

fn print_change(marker: console::StyledObject<&str>, change: &ComponentChange) {
    let before = change.before.map_or("-".to_string(), |v| format!("{:.3}", v));
    let after = change.after.map_or("-".to_string(), |v| format!("{:.3}", v));
    println!(
        "  {} {:<30} {:>9} → {:<9} ({:+.3})",
        marker,
        change.label(),
        before,
        after,
        change.delta
    );
}

fn print_diff(diff: &DiffResult) {
    if diff.is_identical() {
        println!(
            "{} Compositions match ({} component(s))",
            style("✓").green(),
            diff.unchanged
        );
    }
    for c in &diff.added {
        print_change(style("+").green(), c);
    }
    for c in &diff.removed {
        print_change(style("-").red(), c);
    }
    for c in &diff.changed {
        print_change(style("~").yellow(), c);
    }
    println!();
    println!(
        "{}: {:.2}{}",
        style("Match score").bold(),
        diff.effective_score,
        if diff.low_confidence {
            format!(" (raw {:.2}, low-confidence extraction)", diff.match_score)
        } else {
            String::new()
        }
    );
}
