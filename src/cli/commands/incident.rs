//! `chemrec incident` command - incident lifecycle

use chrono::Utc;
use clap::{Subcommand, ValueEnum};
use console::style;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::cli::helpers::{format_short_id, load_config, truncate_str};
use crate::cli::output::emit;
use crate::cli::GlobalOpts;
use crate::core::lifecycle::{IncidentLedger, IncidentMachine, Transition};
use crate::entities::incident::{Incident, IncidentState};

#[derive(Subcommand, Debug)]
pub enum IncidentCommands {
    /// List incidents in a ledger
    List(ListArgs),

    /// Show one incident and its allowed transitions
    Show(ShowArgs),

    /// Escalate an open incident
    Escalate(EscalateArgs),

    /// Override an open incident with a justification
    Override(OverrideArgs),

    /// Resolve an open or escalated incident
    Resolve(ResolveArgs),
}

/// State filter
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateFilter {
    Open,
    Escalated,
    Overridden,
    Resolved,
    /// Open and escalated
    Blocking,
    All,
}

impl StateFilter {
    fn matches(self, state: IncidentState) -> bool {
        match self {
            StateFilter::Open => state == IncidentState::Open,
            StateFilter::Escalated => state == IncidentState::Escalated,
            StateFilter::Overridden => state == IncidentState::Overridden,
            StateFilter::Resolved => state == IncidentState::Resolved,
            StateFilter::Blocking => state.is_blocking(),
            StateFilter::All => true,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Incident ledger file
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    /// Filter by state
    #[arg(long, short = 's', default_value = "all")]
    pub state: StateFilter,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    /// Incident ID (full or unique prefix)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct EscalateArgs {
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    pub id: String,

    /// Why the incident is escalated
    #[arg(long, short = 'm')]
    pub reason: String,
}

#[derive(clap::Args, Debug)]
pub struct OverrideArgs {
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    pub id: String,

    /// Justification for accepting the deviation
    #[arg(long, short = 'm')]
    pub justification: String,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    #[arg(long, short = 'F')]
    pub file: PathBuf,

    pub id: String,

    /// Resolution notes
    #[arg(long, short = 'm')]
    pub notes: String,
}

/// Run an incident subcommand
pub fn run(cmd: IncidentCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        IncidentCommands::List(args) => run_list(args, global),
        IncidentCommands::Show(args) => run_show(args, global),
        IncidentCommands::Escalate(args) => run_transition(
            args.file,
            &args.id,
            Transition::Escalate { reason: args.reason },
            global,
        ),
        IncidentCommands::Override(args) => run_transition(
            args.file,
            &args.id,
            Transition::Override {
                justification: args.justification,
            },
            global,
        ),
        IncidentCommands::Resolve(args) => run_transition(
            args.file,
            &args.id,
            Transition::Resolve { notes: args.notes },
            global,
        ),
    }
}

fn open_ledger(path: &Path) -> Result<IncidentLedger> {
    if !path.exists() {
        return Err(miette::miette!("Incident ledger not found: {}", path.display()));
    }
    IncidentLedger::load(path).map_err(|e| miette::miette!("{}", e))
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ledger = open_ledger(&args.file)?;
    let incidents: Vec<&Incident> = ledger
        .incidents()
        .iter()
        .filter(|i| args.state.matches(i.state))
        .collect();

    if emit(&incidents, None, global.format)? {
        return Ok(());
    }

    if incidents.is_empty() {
        println!("No incidents found.");
        return Ok(());
    }
    println!(
        "{:<17} {:<11} {:<9} {:<24} {}",
        style("ID").bold(),
        style("STATE").bold(),
        style("SEVERITY").bold(),
        style("ATTRIBUTE").bold(),
        style("SUBMISSION").bold()
    );
    for inc in &incidents {
        println!(
            "{:<17} {:<11} {:<9} {:<24} {}",
            format_short_id(&inc.id),
            inc.state,
            inc.severity,
            truncate_str(inc.attribute_key.as_str(), 24),
            format_short_id(&inc.submission)
        );
    }
    println!();
    println!(
        "{} incident(s), {} blocking",
        incidents.len(),
        incidents.iter().filter(|i| i.state.is_blocking()).count()
    );
    Ok(())
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ledger = open_ledger(&args.file)?;
    let inc = ledger.get(&args.id).map_err(|e| miette::miette!("{}", e))?;

    if emit(inc, Some(&inc.id), global.format)? {
        return Ok(());
    }

    let machine = IncidentMachine::new(&load_config(global.config.as_deref())?);
    println!("{}", style("─".repeat(60)).dim());
    println!("{}: {}", style("ID").bold(), style(inc.id).cyan());
    println!("{}: {}", style("Product").bold(), inc.product);
    println!("{}: {}", style("Submission").bold(), inc.submission);
    println!("{}: {}", style("Attribute").bold(), style(&inc.attribute_key).yellow());
    println!("{}: {} → {}", style("Values").bold(), inc.expected, inc.actual);
    if let Some(d) = inc.deviation_percent {
        println!("{}: {:.2}%", style("Deviation").bold(), d);
    }
    println!("{}: {}", style("Severity").bold(), inc.severity);
    println!("{}: {}", style("State").bold(), inc.state);
    if let Some(notes) = &inc.notes {
        println!("{}: {}", style("Notes").bold(), notes);
    }
    println!("{}", style("─".repeat(60)).dim());
    let allowed = machine.allowed_transitions(inc.state);
    if allowed.is_empty() {
        println!("No further transitions ({} is terminal)", inc.state);
    } else {
        let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
        println!("Allowed transitions: {}", names.join(", "));
    }
    Ok(())
}

fn run_transition(
    file: PathBuf,
    id: &str,
    transition: Transition,
    global: &GlobalOpts,
) -> Result<()> {
    let config = load_config(global.config.as_deref())?;
    let machine = IncidentMachine::new(&config);
    let mut ledger = open_ledger(&file)?;

    let event = ledger
        .transition(&machine, id, transition, Utc::now())
        .map_err(|e| miette::miette!("{}", e))?;
    ledger.save(&file).map_err(|e| miette::miette!("{}", e))?;

    if !emit(&event, Some(&event.incident_id), global.format)? {
        println!(
            "{} {} {} → {}",
            style("✓").green(),
            style(format_short_id(&event.incident_id)).cyan(),
            event.from.map_or("new".to_string(), |s| s.to_string()),
            style(event.to).yellow()
        );
    }
    Ok(())
}
