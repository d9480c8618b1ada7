use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use vapprun_core::RunOptions;

mod commands;

#[derive(Parser)]
#[command(name = "vapprun")]
#[command(about = "Run vApps of local VMware virtual machines", long_about = None)]
struct Cli {
    /// Regenerate environments without powering anything on or off
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Power VMs on with a console window
    #[arg(long, global = true)]
    gui: bool,

    /// Seconds between guest address polls after power-on
    #[arg(long, global = true, default_value = "1")]
    poll_interval: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a workspace in the current directory
    Init,

    /// Power on a VM or vApp
    Start {
        /// Entity name
        entity: String,
    },

    /// Power off a VM or vApp
    Stop {
        /// Entity name
        entity: String,

        /// Hard power off instead of a guest shutdown
        #[arg(short, long)]
        force: bool,
    },

    /// Hard power off a VM or vApp, ignoring entities already stopped
    Shutdown {
        /// Entity name
        entity: String,
    },

    /// List all entities in the workspace
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    vapprun_core::init_observability(cli.verbose);

    let options = RunOptions {
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        gui: cli.gui,
        poll_interval: Duration::from_secs(cli.poll_interval),
    };

    match cli.command {
        Commands::Init => commands::init()?,
        Commands::Start { entity } => commands::start(&entity, options).await?,
        Commands::Stop { entity, force } => commands::stop(&entity, force, options).await?,
        Commands::Shutdown { entity } => commands::shutdown(&entity, options).await?,
        Commands::List => commands::list(options).await?,
    }

    Ok(())
}
