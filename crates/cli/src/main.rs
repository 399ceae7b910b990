mod commands;
mod discovery;
mod logging;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use commands::*;
use logging::{init_logging, LoggingConfig};
use tideway::MigrationConfig;

#[derive(Parser)]
#[command(name = "tideway", version)]
#[command(about = "Generate and manage migrations from SQL files")]
#[command(long_about = "Generate and manage migrations from SQL files.\n\n\
    Without a command, tideway embeds the migrations it finds into a Rust module. \
    Migrations are read from the directory given with -m, otherwise from the one \
    \"migrations\" directory below the working directory, otherwise from the \
    working directory itself.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    generate: GenerateArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Args)]
struct GenerateArgs {
    /// Override the package name from the migration files
    #[arg(short, long)]
    package: Option<String>,

    /// Directory to look for migrations in (otherwise performs search)
    #[arg(short = 'm', long = "migrations")]
    migrations: Option<PathBuf>,

    /// Where to write generated code (default: beside the migrations directory)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new blank migration file
    New {
        /// Name of the migration (default: auto_<datetime>)
        #[arg(short, long)]
        name: Option<String>,

        /// Package name to write into the template
        #[arg(short, long)]
        package: Option<String>,

        /// Directory to create the migration in (otherwise performs search)
        #[arg(short = 'm', long = "migrations")]
        migrations: Option<PathBuf>,
    },

    /// Display the current migration status of the database
    Revision {
        /// Database URL to connect to
        #[arg(short = 'd', long = "db", env = "DATABASE_URL")]
        db: Option<String>,

        /// Show the detailed status of one revision
        #[arg(short, long)]
        revision: Option<i32>,
    },

    /// Apply migrations up to the given or latest revision
    #[command(visible_alias = "up")]
    Migrate(RunArgs),

    /// Roll back migrations down to the given revision, or all of them
    #[command(visible_alias = "down")]
    Rollback(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Directory to look for migrations in (otherwise performs search)
    #[arg(short = 'm', long = "migrations")]
    migrations: Option<PathBuf>,

    /// Database URL to connect to
    #[arg(short = 'd', long = "db", env = "DATABASE_URL")]
    db: Option<String>,

    /// Target revision
    #[arg(short, long)]
    revision: Option<i32>,

    /// Show what would run without executing anything
    #[arg(short = 'D', long = "debug")]
    dry_run: bool,
}

impl RunArgs {
    fn config(&self, base: MigrationConfig) -> MigrationConfig {
        let mut config = base;
        if let Some(dir) = &self.migrations {
            config = config.with_migrations_dir(dir);
        }
        if let Some(db) = &self.db {
            config = config.with_database_url(db);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LoggingConfig::from_flags(cli.verbose, cli.json_logs))?;
    let mut config = MigrationConfig::from_env();

    match cli.command {
        None => {
            let GenerateArgs { package, migrations, out } = cli.generate;
            if let Some(dir) = migrations {
                config = config.with_migrations_dir(dir);
            }
            if let Some(out) = out {
                config = config.with_out(out);
            }
            if let Some(package) = package {
                config = config.with_package(package);
            }
            generate::run(&config)?;
        }
        Some(Commands::New { name, package, migrations }) => {
            if let Some(dir) = migrations {
                config = config.with_migrations_dir(dir);
            }
            new::run(&config, name.as_deref(), package.as_deref())?;
        }
        Some(Commands::Revision { db, revision }) => {
            if let Some(db) = db {
                config = config.with_database_url(db);
            }
            revision::run(&config, revision).await?;
        }
        Some(Commands::Migrate(args)) => {
            let config = args.config(config);
            migrate::up(&config, args.revision, args.dry_run).await?;
        }
        Some(Commands::Rollback(args)) => {
            let config = args.config(config);
            migrate::down(&config, args.revision, args.dry_run).await?;
        }
    }

    Ok(())
}
