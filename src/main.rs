use anyhow::Result;
use cadsync::cli::{Cli, Commands};
use cadsync::output::{self, Verbosity};
use cadsync::{CadsyncContext, commands};
use clap::{CommandFactory, Parser};
use clap_complete::{Generator, generate};
use colored::Colorize;
use std::io;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("CADSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    if cli.quiet {
        output::set_verbosity(Verbosity::Quiet);
    } else if cli.verbose {
        output::set_verbosity(Verbosity::Verbose);
    }

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let mut ctx = CadsyncContext::new()?;

    match cli.command {
        Commands::Update { root } => commands::update::execute(&mut ctx, root)?,
        Commands::Sync => commands::sync::execute(&ctx)?,
        Commands::Register { name } => commands::register::register(&ctx, &name)?,
        Commands::Unregister { name } => commands::register::unregister(&ctx, &name)?,
        Commands::Status { short } => commands::status::execute(&ctx, short)?,
        Commands::Open { name } => commands::documents::open(&ctx, &name)?,
        Commands::New {
            kind,
            dir,
            designation,
            title,
        } => commands::documents::new(&ctx, kind.into(), &dir, &designation, &title)?,
        Commands::Rm { name } => commands::documents::rm(&ctx, &name)?,
        Commands::Mkdir { parent, name } => commands::documents::mkdir(&ctx, &parent, &name)?,
        Commands::Watch => commands::watch::execute(&ctx)?,
        Commands::Config {
            key,
            value,
            unset,
            list,
        } => commands::config::execute(&mut ctx, key.as_deref(), value, unset, list)?,
        Commands::Completion { .. } => {}
    }

    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}
