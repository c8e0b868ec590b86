use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use spine_toolbox::{
    Engine, Event, EventSender, ExecutionRequest, ItemState, OutputStream, Project, RunStatus,
    Settings, SqliteStorage, Storage, ToolSpecification,
};

#[derive(Parser)]
#[command(name = "spinetoolbox", version)]
#[command(about = "Headless Spine Toolbox: run project DAGs from the command line", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root directory for tool work directories
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a project
    Execute {
        /// Project directory
        project: PathBuf,

        /// Execute only these items
        #[arg(long, num_args = 1..)]
        select: Vec<String>,

        /// Do not execute these items
        #[arg(long, num_args = 1..)]
        deselect: Vec<String>,
    },

    /// List the items of each DAG in a project
    ListItems {
        /// Project directory
        project: PathBuf,
    },

    /// Validate a tool specification file
    CheckSpec {
        /// Specification JSON file
        file: PathBuf,
    },

    /// List recorded tool runs of a project
    Runs {
        /// Project directory
        project: PathBuf,

        /// Show only runs with this status (running, completed, failed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete a recorded run
    DeleteRun {
        /// Project directory
        project: PathBuf,

        /// Run ID to delete
        run_id: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse().expect("valid log directive"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn non_empty(names: Vec<String>) -> Option<HashSet<String>> {
    if names.is_empty() {
        None
    } else {
        Some(names.into_iter().collect())
    }
}

/// Print process output and messages grouped per item as items finish
async fn print_events(mut rx: UnboundedReceiver<Event>) {
    let mut pending: BTreeMap<String, Vec<(OutputStream, String)>> = BTreeMap::new();
    while let Some(event) = rx.recv().await {
        match event {
            Event::ExecStarted { item_name } => {
                pending.entry(item_name).or_default();
            }
            Event::ProcessMsg {
                item_name,
                stream,
                line,
            } => pending.entry(item_name).or_default().push((stream, line)),
            Event::EventMsg {
                item_name,
                level,
                text,
            } => pending
                .entry(item_name)
                .or_default()
                .push((OutputStream::Stdout, format!("[{}] {}", level, text))),
            Event::ExecFinished { item_name, state } => {
                let lines = pending.remove(&item_name).unwrap_or_default();
                if state == ItemState::Skipped && lines.is_empty() {
                    continue;
                }
                println!("==> {} ({})", item_name, state);
                for (stream, line) in lines {
                    match stream {
                        OutputStream::Stdout => println!("    {}", line),
                        OutputStream::Stderr => eprintln!("    {}", line),
                    }
                }
            }
            Event::DagFinished { dag_index, state } => {
                println!("DAG {} {}", dag_index + 1, state);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Execute {
            project,
            select,
            deselect,
        } => {
            let project = Project::open(&project).context("failed to open project")?;

            // Precedence: CLI > env > project > global > defaults
            let mut settings =
                Settings::load(Some(project.dir())).context("failed to load settings")?;
            if let Some(work_dir) = cli.work_dir {
                settings.work_dir = Some(work_dir);
            }

            let storage = SqliteStorage::for_project(project.dir())
                .context("failed to initialize run history")?;
            let (events, rx) = EventSender::channel();
            let printer = tokio::spawn(print_events(rx));

            let request = ExecutionRequest {
                selected: non_empty(select),
                deselected: non_empty(deselect),
            };
            info!(project = %project.dir().display(), "executing project");
            let result = Engine::new(settings)
                .with_events(events)
                .with_storage(Box::new(storage))
                .execute(&project, &request)
                .await;
            printer.await.context("event printer failed")?;

            let summary = result?;
            if !summary.success() {
                error!("project execution failed");
                std::process::exit(1);
            }
        }

        Commands::ListItems { project } => {
            let project = Project::open(&project).context("failed to open project")?;
            let dags = project.dags();
            for (i, dag) in dags.iter().enumerate() {
                println!("DAG {}/{}:", i + 1, dags.len());
                println!("{}", dag.node_names().join(" "));
            }
        }

        Commands::CheckSpec { file } => {
            let spec = ToolSpecification::load(&file)?;
            spec.validate()?;
            println!(
                "Specification '{}' is valid ({}, main program {})",
                spec.name,
                spec.tooltype,
                spec.main_program()
            );
        }

        Commands::Runs { project, status } => {
            let project = Project::open(&project).context("failed to open project")?;
            let storage = SqliteStorage::for_project(project.dir())
                .context("failed to initialize run history")?;

            let status_filter = status
                .as_deref()
                .map(|s| {
                    s.parse::<RunStatus>()
                        .with_context(|| format!("invalid status filter: {}", s))
                })
                .transpose()?;

            let runs: Vec<_> = storage
                .list()
                .await?
                .into_iter()
                .filter(|run| status_filter.is_none_or(|s| run.status == s))
                .collect();
            if runs.is_empty() {
                println!("No runs found.");
                return Ok(());
            }

            println!(
                "{:<10} {:<10} {:<20} {:<9} {:<20} SPECIFICATION",
                "ID", "STATUS", "STARTED", "DURATION", "ITEM"
            );
            println!("{}", "-".repeat(90));
            for run in runs {
                println!("{}", run);
            }
        }

        Commands::DeleteRun { project, run_id } => {
            let project = Project::open(&project).context("failed to open project")?;
            let storage = SqliteStorage::for_project(project.dir())
                .context("failed to initialize run history")?;

            if !storage.delete(&run_id).await? {
                anyhow::bail!("run not found: {}", run_id);
            }
            println!("Deleted run: {}", run_id);
        }
    }

    Ok(())
}
