//! `chemrec baseline` command - recalculate a product baseline

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{format_short_id, load, load_config, load_rules, save, truncate_str};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::core::engine::ReconciliationEngine;
use crate::core::field_logic::ProductInputs;
use crate::core::policy::FieldValue;
use crate::core::snapshot::BaselineHistory;
use crate::entities::baseline::Baseline;
use crate::entities::submission::{ReferenceData, Submission};

#[derive(clap::Args, Debug)]
pub struct BaselineArgs {
    /// Attribute rule set
    #[arg(long, short = 'r')]
    pub rules: PathBuf,

    /// Submission files to reconcile
    #[arg(long, short = 's', num_args = 1.., required = true)]
    pub submissions: Vec<PathBuf>,

    /// Reference data from the system of record (flat key: value map)
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Baseline variant; rules scoped to other variants are skipped
    #[arg(long)]
    pub variant: Option<String>,

    /// Baseline history file; read for the current version and updated in place
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Write the new baseline snapshot to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: BaselineArgs, global: &GlobalOpts) -> Result<()> {
    let rules = load_rules(&args.rules)?;
    let config = load_config(global.config.as_deref())?;

    let submissions = args
        .submissions
        .iter()
        .map(|p| load::<Submission>(p))
        .collect::<Result<Vec<_>>>()?;
    let product = submissions
        .first()
        .map(|s| s.product.clone())
        .ok_or_else(|| miette::miette!("At least one submission is required"))?;

    let mut inputs = ProductInputs::new(product.clone());
    inputs.variant = args.variant.clone();
    inputs.submissions = submissions;
    if let Some(path) = &args.reference {
        inputs.reference = load::<ReferenceData>(path)?;
    }

    let engine = ReconciliationEngine::new(rules, config);
    if let Some(path) = args.history.as_deref().filter(|p| p.exists()) {
        let history = BaselineHistory::load(path).map_err(|e| miette::miette!("{}", e))?;
        if history.product() != product {
            return Err(miette::miette!(
                "History {} belongs to product '{}', submissions are for '{}'",
                path.display(),
                history.product(),
                product
            ));
        }
        engine.store().insert(history);
    }

    let baseline = engine
        .recalculate(&inputs)
        .map_err(|e| miette::miette!("{}", e))?;

    if let Some(path) = &args.history {
        if let Some(history) = engine.store().history(&product) {
            history.save(path).map_err(|e| miette::miette!("{}", e))?;
        }
    }
    if let Some(path) = &args.output {
        save(path, &baseline)?;
    }

    if !emit(&baseline, Some(&baseline.id), global.format)? {
        print_baseline(&baseline);
    }
    Ok(())
}

fn print_baseline(baseline: &Baseline) {
    println!(
        "{} Baseline {} for {} (version {})",
        style("✓").green(),
        style(format_short_id(&baseline.id)).cyan(),
        style(&baseline.product).yellow(),
        baseline.version
    );
    if let Some(variant) = &baseline.variant {
        println!("  Variant: {}", variant);
    }
    println!("{}", style("─".repeat(72)).dim());
    println!(
        "{:<28} {:<12} {:<24} {}",
        style("ATTRIBUTE").bold(),
        style("POLICY").bold(),
        style("VALUE").bold(),
        style("SOURCES").bold()
    );
    for (key, field) in &baseline.fields {
        let value = match &field.value {
            FieldValue::Unset if field.needs_manual_entry => {
                style("(manual entry)".to_string()).yellow().to_string()
            }
            FieldValue::Blocked => style("(blocked)".to_string()).dim().to_string(),
            other => truncate_str(&other.to_string(), 24),
        };
        println!(
            "{:<28} {:<12} {:<24} {}",
            truncate_str(key.as_str(), 28),
            field.policy,
            value,
            field.sources.len()
        );
    }

    let pending = baseline.pending_manual();
    if !pending.is_empty() {
        println!();
        println!(
            "{} {} attribute(s) awaiting manual entry",
            style("!").yellow(),
            pending.len()
        );
    }
}
