//! `chemrec rules` command - attribute rule sets

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{load_rules, truncate_str};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::entities::rule::{RawRule, RuleSet};

#[derive(Subcommand, Debug)]
pub enum RulesCommands {
    /// Validate a rule set and report every invalid rule
    Check(CheckArgs),

    /// List the rules in a rule set
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Rule set file
    pub path: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Rule set file
    pub path: PathBuf,

    /// Only rules that apply to this variant
    #[arg(long)]
    pub variant: Option<String>,
}

pub fn run(cmd: RulesCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        RulesCommands::Check(args) => run_check(args),
        RulesCommands::List(args) => run_list(args, global),
    }
}

fn run_check(args: CheckArgs) -> Result<()> {
    let rules = load_rules(&args.path)?;
    let critical = rules.iter().filter(|r| r.critical).count();
    println!(
        "{} {} rule(s) valid ({} critical)",
        style("✓").green(),
        rules.len(),
        critical
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let rules: RuleSet = load_rules(&args.path)?;
    let raw: Vec<RawRule> = rules
        .for_variant(args.variant.as_deref())
        .map(|r| r.to_raw())
        .collect();

    if emit(&raw, None, global.format)? {
        return Ok(());
    }

    println!(
        "{:<28} {:<12} {:<20} {:<8} {}",
        style("ATTRIBUTE").bold(),
        style("POLICY").bold(),
        style("SOURCE/HIERARCHY").bold(),
        style("TYPE").bold(),
        style("FLAGS").bold()
    );
    for rule in &raw {
        let detail = match (&rule.source, &rule.hierarchy) {
            (Some(s), _) => s.clone(),
            (None, Some(h)) => h.to_string(),
            (None, None) => "-".to_string(),
        };
        let mut flags = Vec::new();
        if rule.critical {
            flags.push("critical");
        }
        if rule.requires_action {
            flags.push("action");
        }
        println!(
            "{:<28} {:<12} {:<20} {:<8} {}",
            truncate_str(&rule.key, 28),
            rule.policy,
            truncate_str(&detail, 20),
            rule.value_type.map_or("-".to_string(), |t| t.to_string()),
            flags.join(",")
        );
    }
    Ok(())
}
