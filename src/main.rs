use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

use chemrec::cli::commands::{baseline, diff, incident, rules, validate};
use chemrec::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Install miette's fancy error handler for beautiful diagnostics
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();

    let default_level = match cli.global.verbose {
        0 => "warn",
        1 => "chemrec=info",
        _ => "chemrec=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let global = &cli.global;
    match cli.command {
        Commands::Baseline(args) => baseline::run(args, global),
        Commands::Diff(args) => diff::run_diff(args, global),
        Commands::Merge(args) => diff::run_merge(args, global),
        Commands::Intake(args) => diff::run_intake(args, global),
        Commands::Validate(args) => validate::run(args, global),
        Commands::Incident(cmd) => incident::run(cmd, global),
        Commands::Rules(cmd) => rules::run(cmd, global),
    }
}
