//! Operator entry point for layout core.
//!
//! # Responsibility
//! - Verify `layout_core` linkage (`ping`, `version`).
//! - Run default-layout maintenance against a database file.
//!
//! # Invariants
//! - All layout rules are enforced by `layout_core`; this binary only wires
//!   configuration, storage and output.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use layout_core::db::open_db_with;
use layout_core::{
    init_logging_from_config, CoreConfig, FilterLayoutsQuery, LayoutOrder, LayoutScope,
    LayoutService, SqliteChangeLog, SqliteLayoutStore,
};
use log::info;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "layout_cli")]
#[command(about = "Layout core smoke checks and default-layout maintenance")]
struct Cli {
    /// JSON config file; `LAYOUT_CORE_*` variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `db_path` from config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the core health-check answer
    Ping,

    /// Print the core crate version
    Version,

    /// Create the built-in default layout unless the environment has a default
    CreateDefault {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Actor recorded in the change log
        #[arg(long)]
        actor: Option<Uuid>,
    },

    /// List active layouts of an environment
    List {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Case-insensitive name fragment
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Make a layout the environment default
    SetDefault {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        layout: Uuid,
        /// Actor recorded in the change log
        #[arg(long)]
        actor: Option<Uuid>,
    },
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    environment: Uuid,
    #[arg(long)]
    organization: Uuid,
}

impl ScopeArgs {
    fn scope(&self) -> LayoutScope {
        LayoutScope::new(self.environment, self.organization)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Ping => {
            println!("layout_core ping={}", layout_core::ping());
            return Ok(());
        }
        Command::Version => {
            println!("layout_core version={}", layout_core::core_version());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli)?;
    init_logging_from_config(&config)
        .map_err(anyhow::Error::msg)
        .context("failed to initialize logging")?;

    let Some(db_path) = config.db_path.as_ref() else {
        bail!("no database configured; pass --db or set LAYOUT_CORE_DB_PATH");
    };
    let conn = open_db_with(db_path, &config.db_options())
        .with_context(|| format!("failed to open database `{}`", db_path.display()))?;
    let service = LayoutService::new(
        SqliteLayoutStore::try_new(&conn)?,
        SqliteChangeLog::new(&conn),
    )
    .with_settings(config.service_settings());

    match cli.command {
        Command::CreateDefault { scope, actor } => {
            let actor = actor.unwrap_or_else(Uuid::nil);
            let layout = service.create_default(&scope.scope(), actor)?;
            info!(
                "event=cli_create_default module=cli status=ok layout_id={}",
                layout.id
            );
            println!("{}\t{}", layout.id, layout.identifier);
        }
        Command::List {
            scope,
            name,
            limit,
            offset,
        } => {
            let query = FilterLayoutsQuery {
                name_contains: name,
                order: LayoutOrder::NameAscending,
                limit,
                offset,
            };
            let page = service.filter(&scope.scope(), &query)?;
            for layout in &page.items {
                let marker = if layout.is_default { "*" } else { " " };
                println!("{marker} {}\t{}\t{}", layout.id, layout.identifier, layout.name);
            }
            println!(
                "total={} offset={} limit={}",
                page.total_count, page.offset, page.applied_limit
            );
        }
        Command::SetDefault {
            scope,
            layout,
            actor,
        } => {
            let actor = actor.unwrap_or_else(Uuid::nil);
            let current = service.set_default(&scope.scope(), actor, layout)?;
            println!("{}\tdefault", current.id);
        }
        Command::Ping | Command::Version => {}
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let config = match cli.config.as_ref() {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config `{}`", path.display()))?;
            CoreConfig::from_json_str(&json)?
        }
        None => CoreConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(db) = cli.db.as_ref() {
        config.db_path = Some(db.clone());
    }
    Ok(config)
}
