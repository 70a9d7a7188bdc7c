mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use strata_core::release::BumpType;
use tracing::Level;

use commands::RunOptions;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Incremental, layer-aware monorepo build and release orchestration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace root holding the optional workspace strata.toml
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long, global = true, action)]
    quiet: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Only run the task in these packages (and what it waits for)
    #[arg(short = 'p', long = "package")]
    packages: Vec<String>,
    #[arg(short = 'j', long)]
    parallel: Option<usize>,
    #[arg(long, action)]
    stop_on_failure: bool,
    #[arg(long, action)]
    json: bool,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        RunOptions {
            packages: args.packages,
            parallel: args.parallel,
            stop_on_failure: args.stop_on_failure,
            json: args.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the `build` task
    Build {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Run the `test` task
    Test {
        #[command(flatten)]
        args: RunArgs,
    },
    /// Run arbitrary tasks
    Run {
        #[arg(required = true)]
        tasks: Vec<String>,
        #[command(flatten)]
        args: RunArgs,
    },
    /// Report dependencies that break the layer rules
    CheckLayers {
        #[arg(long, action)]
        json: bool,
    },
    /// Check, version-bump and tag a release
    ///
    /// Bumped versions are written to the package descriptors and left
    /// uncommitted. Tags are created on the current HEAD, so they do not
    /// contain the bump; use --no-tag and tag after committing to include it.
    Release {
        #[arg(value_enum)]
        kind: BumpArg,
        /// Release one package and patch-bump its dependents
        #[arg(long)]
        package: Option<String>,
        #[arg(long, action)]
        dry_run: bool,
        #[arg(long, action)]
        no_tag: bool,
        #[arg(long, action)]
        json: bool,
    },
    /// Show tasks in execution order
    Graph {
        #[arg(long, action)]
        json: bool,
    },
    /// List packages with their layers, versions and tasks
    List {
        #[arg(long, action)]
        json: bool,
    },
    /// Show what a package depends on and what depends on it
    Why {
        package: String,
    },
    /// Delete the fingerprint store
    Clean,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum BumpArg {
    Major,
    Minor,
    Patch,
}

impl From<BumpArg> for BumpType {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Major => BumpType::Major,
            BumpArg::Minor => BumpType::Minor,
            BumpArg::Patch => BumpType::Patch,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let root = cli.root;
    let success = match cli.command {
        Commands::Build { args } => {
            commands::cmd_run(&root, vec!["build".to_string()], args.into())?
        }
        Commands::Test { args } => {
            commands::cmd_run(&root, vec!["test".to_string()], args.into())?
        }
        Commands::Run { tasks, args } => commands::cmd_run(&root, tasks, args.into())?,
        Commands::CheckLayers { json } => commands::cmd_check_layers(&root, json)?,
        Commands::Release {
            kind,
            package,
            dry_run,
            no_tag,
            json,
        } => commands::cmd_release(
            &root,
            kind.into(),
            commands::ReleaseOptions {
                package,
                dry_run,
                no_tag,
                json,
            },
        )?,
        Commands::Graph { json } => commands::cmd_graph(&root, json)?,
        Commands::List { json } => commands::cmd_list(&root, json)?,
        Commands::Why { package } => commands::cmd_why(&root, &package)?,
        Commands::Clean => commands::cmd_clean(&root)?,
    };

    if !success {
        std::process::exit(1);
    }

    Ok(())
}
