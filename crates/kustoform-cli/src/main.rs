//! Kustoform CLI - Kustomize overlays from configuration blocks, applied to Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod backend;
mod commands;
mod context;
mod display;
mod error;
mod exit_codes;
mod settings;
mod util;

use commands::schema::SchemaTarget;
use context::{Context, GlobalArgs};

#[derive(Parser)]
#[command(name = "kustoform")]
#[command(author = "Kustoform Contributors")]
#[command(version)]
#[command(about = "Build Kustomize overlays from configuration blocks and apply them to Kubernetes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a configuration block and print the manifests
    Build {
        /// Configuration block (YAML or JSON)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Write the manifests to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the kustomization generated from a configuration block
    Kustomization {
        /// Configuration block (YAML or JSON)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// Show what apply would change
    Plan {
        /// State name
        name: String,

        /// Configuration block (YAML or JSON)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build and server-side apply a configuration block
    Apply {
        /// State name
        name: String,

        /// Configuration block (YAML or JSON)
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Take ownership of fields managed by other field managers
        #[arg(long)]
        force_conflicts: bool,

        /// Delete objects that left the build
        #[arg(long)]
        prune: bool,
    },

    /// Read the live objects of a managed state back
    Refresh {
        /// State name
        name: String,
    },

    /// Delete the applied objects and the managed state
    Destroy {
        /// State name
        name: String,
    },

    /// Show a managed state
    Show {
        /// State name
        name: String,

        /// Show every stored serial
        #[arg(long)]
        history: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List managed states
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print attribute declarations as JSON
    Schema {
        #[arg(value_enum, default_value_t)]
        target: SchemaTarget,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "kustoform=debug,kustoform_core=debug,kustoform_engine=debug,kustoform_kube=debug,kustoform_provider=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

async fn run(cli: Cli) -> error::Result<()> {
    match cli.command {
        Commands::Kustomization { file } => return commands::kustomization::run(&file),
        Commands::Schema { target } => return commands::schema::run(target),
        _ => {}
    }

    let ctx = Context::new(cli.global)?;

    match cli.command {
        Commands::Build { file, output } => {
            commands::build::run(&ctx, &file, output.as_deref()).await
        }
        Commands::Plan { name, file, json } => commands::plan::run(&ctx, &name, &file, json).await,
        Commands::Apply {
            name,
            file,
            force_conflicts,
            prune,
        } => commands::apply::run(&ctx, &name, &file, force_conflicts, prune).await,
        Commands::Refresh { name } => commands::refresh::run(&ctx, &name).await,
        Commands::Destroy { name } => commands::destroy::run(&ctx, &name).await,
        Commands::Show {
            name,
            history,
            json,
        } => commands::show::run(&ctx, &name, history, json).await,
        Commands::List { json } => commands::list::run(&ctx, json).await,
        Commands::Kustomization { .. } | Commands::Schema { .. } => Ok(()),
    }
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
