mod cli;
mod commands;
mod config;
mod engine;
mod input;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::{ConfigError, Settings};
use std::io;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub settings: Settings,
    /// Cancelled on Ctrl-C; every wait watches it
    pub cancel: CancellationToken,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings =
        Settings::load(cli.config.as_deref())?.with_overrides(cli.host, cli.token, cli.user);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let ctx = Context {
        quiet: cli.quiet,
        settings,
        cancel,
    };

    match cli.command {
        Command::Kinds { kind } => commands::offline::kinds(kind.as_deref()),
        Command::Expand(args) => commands::offline::expand_file(&args.kind.kind, &args.file),
        Command::Flatten { file, prior } => {
            commands::offline::flatten_file(&file.kind.kind, &file.file, prior.as_deref())
        }
        Command::Diff {
            kind,
            desired,
            observed,
            text,
        } => commands::offline::diff_files(&kind.kind, &desired, &observed, text),
        Command::Id { kind, id } => commands::offline::parse_id(&kind.kind, &id),
        Command::Plan(args) => commands::remote::plan(&ctx, &args).await,
        Command::Apply { target, yes, dry_run } => {
            commands::remote::apply(&ctx, &target, yes, dry_run).await
        }
        Command::Read(args) => commands::remote::read(&ctx, &args).await,
        Command::Destroy { target, yes } => commands::remote::destroy(&ctx, &target, yes).await,
        Command::Import(args) => commands::remote::import(&ctx, &args).await,
        Command::State(cmd) => commands::state::run(&ctx, &cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "cloudsync", &mut io::stdout());
            Ok(())
        }
    }
}

/// Print the error chain, plus advice for the typed errors we know.
fn report(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(advice) = advice_for(err) {
        ui::dim(advice);
    }
}

fn advice_for(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<declarative::Error>() {
            Some(e.category().advice())
        } else if let Some(e) = cause.downcast_ref::<cloudkit::Error>() {
            Some(e.category().advice())
        } else {
            cause.downcast_ref::<ConfigError>().map(ConfigError::advice)
        }
    })
}
