use std::path::PathBuf;
use std::process::ExitCode;

use agentcore_dev::app::{run_build, run_dev, Overrides};
use agentcore_dev::logging::init_logging;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};

/// Run agent workloads locally with live rebuilds and an interactive chat.
#[derive(Parser, Debug)]
#[command(name = "agentcore-dev", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    target: TargetArgs,

    /// Show debug diagnostics on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the agent locally and chat with it
    Dev,

    /// Build images for every agent that needs one
    Build {
        /// Push the built images to the registry
        #[arg(long)]
        push: bool,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Resolved agent config; defaults to <project>/.agentcore/agent.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Agent to run when the config declares several
    #[arg(long, global = true)]
    agent: Option<String>,

    /// Execution role the workload assumes
    #[arg(long, global = true)]
    role_arn: Option<String>,

    #[arg(long, global = true)]
    region: Option<String>,

    /// Local port the workload listens on
    #[arg(long, global = true)]
    port: Option<u16>,
}

impl From<TargetArgs> for Overrides {
    fn from(args: TargetArgs) -> Self {
        Self {
            project: args.project,
            config: args.config,
            agent: args.agent,
            role_arn: args.role_arn,
            region: args.region,
            port: args.port,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides::from(cli.target);
    match cli.command {
        Commands::Dev => run_dev(overrides).await.context("dev mode failed"),
        Commands::Build { push } => {
            let images = run_build(overrides, push).await.context("build failed")?;
            if images.is_empty() {
                println!("No agents need an image build.");
            }
            for image in images {
                println!("{image}");
            }
            Ok(())
        }
    }
}
