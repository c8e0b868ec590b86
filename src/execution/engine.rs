use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::{
    TagContext, archive_outputs, build_command, create_result_dir, create_work_dir, files_in_dir,
    run_command, stage_work_dir,
};
use crate::config::Settings;
use crate::error::ToolboxError;
use crate::event::{DagState, Event, EventSender, ItemState, MessageLevel};
use crate::history::{RunRecord, Storage};
use crate::project::{Dag, ExecutionPermits, ItemDict, ItemType, Project};
use crate::spec::ToolSpecification;

/// Which items to execute
#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Execute only these items; `None` means all
    pub selected: Option<HashSet<String>>,
    /// Never execute these items
    pub deselected: Option<HashSet<String>>,
}

impl ExecutionRequest {
    pub fn all() -> Self {
        Self::default()
    }
}

/// Result of executing one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub state: ItemState,
    /// Why the item failed or was skipped
    pub message: Option<String>,
    /// Run record ID for Tool items
    pub run_id: Option<String>,
    /// Archive directory of a successful Tool run
    pub result_dir: Option<PathBuf>,
}

impl ItemOutcome {
    fn new(state: ItemState) -> Self {
        Self {
            state,
            message: None,
            run_id: None,
            result_dir: None,
        }
    }

    fn with_message(state: ItemState, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(state)
        }
    }
}

/// Result of executing a project
#[derive(Debug, Clone, Default)]
pub struct ExecutionSummary {
    /// Outcome of every item in an executed DAG
    pub items: BTreeMap<String, ItemOutcome>,
    /// Final state of each executed DAG, by DAG index
    pub dags: BTreeMap<usize, DagState>,
    /// Selected or deselected names that match no item
    pub unknown_items: Vec<String>,
}

impl ExecutionSummary {
    /// True if no DAG failed
    pub fn success(&self) -> bool {
        self.dags.values().all(|state| *state == DagState::Completed)
    }

    pub fn state_of(&self, name: &str) -> Option<ItemState> {
        self.items.get(name).map(|outcome| outcome.state)
    }
}

/// Files and database URLs an item passes to its successors
#[derive(Debug, Clone, Default)]
struct Resources {
    files: Vec<PathBuf>,
    urls: BTreeMap<String, String>,
}

impl Resources {
    fn extend(&mut self, other: &Resources) {
        for file in &other.files {
            if !self.files.contains(file) {
                self.files.push(file.clone());
            }
        }
        self.urls
            .extend(other.urls.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Runs a project's DAGs locally
pub struct Engine {
    settings: Settings,
    events: EventSender,
    storage: Option<Box<dyn Storage>>,
}

impl Engine {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            events: EventSender::noop(),
            storage: None,
        }
    }

    /// Send execution events to `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    /// Record every Tool run in `storage`
    pub fn with_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute every DAG of `project`.
    ///
    /// Fails before running anything if a DAG contains a cycle. Item failures
    /// are reported in the summary, not as errors.
    pub async fn execute(
        &self,
        project: &Project,
        request: &ExecutionRequest,
    ) -> Result<ExecutionSummary, ToolboxError> {
        let dags = project.dags();
        if dags.iter().any(|dag| !dag.is_acyclic()) {
            error!("project contains a cycle");
            return Err(ToolboxError::NotADag);
        }

        let mut summary = ExecutionSummary {
            unknown_items: unknown_items(project, request),
            ..ExecutionSummary::default()
        };
        for name in &summary.unknown_items {
            warn!(item = %name, "no such item in the project");
        }

        let limiter = self.settings.engine.process_limit().map(Semaphore::new);
        info!(
            dags = dags.len(),
            limit = ?self.settings.engine.process_limit(),
            "executing project"
        );

        for (index, dag) in dags.iter().enumerate() {
            let permits = ExecutionPermits::new(
                dag,
                request.selected.as_ref(),
                request.deselected.as_ref(),
            );
            if !permits.any() {
                debug!(dag = index + 1, "nothing to execute in DAG");
                continue;
            }
            let state = self
                .execute_dag(project, dag, &permits, limiter.as_ref(), &mut summary)
                .await?;
            info!(dag = index + 1, state = %state, "DAG finished");
            self.events.emit(Event::DagFinished {
                dag_index: index,
                state,
            });
            summary.dags.insert(index, state);
            if state == DagState::Failed {
                if index + 1 < dags.len() {
                    warn!(
                        remaining = dags.len() - index - 1,
                        "stopping after failed DAG"
                    );
                }
                break;
            }
        }
        Ok(summary)
    }

    async fn execute_dag(
        &self,
        project: &Project,
        dag: &Dag,
        permits: &ExecutionPermits,
        limiter: Option<&Semaphore>,
        summary: &mut ExecutionSummary,
    ) -> Result<DagState, ToolboxError> {
        let mut produced: HashMap<String, Resources> = HashMap::new();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut state = DagState::Completed;

        for layer in dag.layers()? {
            let pending: Vec<(&str, Resources, bool)> = layer
                .iter()
                .map(|&name| {
                    let mut inputs = Resources::default();
                    for predecessor in dag.predecessors(name) {
                        if let Some(resources) = produced.get(predecessor) {
                            inputs.extend(resources);
                        }
                    }
                    (name, inputs, blocked.contains(name))
                })
                .collect();

            let runs = pending.into_iter().map(|(name, inputs, is_blocked)| {
                let permitted = permits.is_permitted(name);
                async move {
                    let result = if is_blocked {
                        (
                            ItemOutcome::with_message(ItemState::Skipped, "upstream item failed"),
                            Resources::default(),
                        )
                    } else {
                        self.execute_item(project, name, permitted, inputs, limiter)
                            .await
                    };
                    (name, result)
                }
            });

            for (name, (outcome, resources)) in join_all(runs).await {
                self.events.emit(Event::ExecFinished {
                    item_name: name.to_string(),
                    state: outcome.state,
                });
                if outcome.state == ItemState::Failed {
                    state = DagState::Failed;
                    blocked.extend(dag.descendants(name));
                }
                produced.insert(name.to_string(), resources);
                summary.items.insert(name.to_string(), outcome);
            }
        }
        Ok(state)
    }

    async fn execute_item(
        &self,
        project: &Project,
        name: &str,
        permitted: bool,
        inputs: Resources,
        limiter: Option<&Semaphore>,
    ) -> (ItemOutcome, Resources) {
        let Some(item) = project.item(name) else {
            return (
                ItemOutcome::with_message(ItemState::Failed, "item not found"),
                Resources::default(),
            );
        };

        if !permitted {
            debug!(item = %name, "item not selected");
            let resources = self.static_resources(project, name, item);
            return (
                ItemOutcome::with_message(ItemState::Skipped, "not selected"),
                resources,
            );
        }

        self.events.emit(Event::ExecStarted {
            item_name: name.to_string(),
        });
        match &item.item_type {
            ItemType::DataConnection | ItemType::DataStore => (
                ItemOutcome::new(ItemState::Completed),
                self.static_resources(project, name, item),
            ),
            ItemType::Tool => self.execute_tool(project, name, item, &inputs, limiter).await,
            other => {
                self.events.message(
                    name,
                    MessageLevel::Warning,
                    format!("{} items are not executed locally", other),
                );
                (
                    ItemOutcome::with_message(ItemState::NotExecuted, "not executed locally"),
                    Resources::default(),
                )
            }
        }
    }

    /// Resources Data Connections and Data Stores provide without running
    fn static_resources(&self, project: &Project, name: &str, item: &ItemDict) -> Resources {
        let mut resources = Resources::default();
        match item.item_type {
            ItemType::DataConnection => {
                for reference in item.file_references(project.dir()) {
                    if reference.is_file() {
                        resources.files.push(reference);
                    } else {
                        warn!(item = %name, path = %reference.display(), "file reference not found");
                    }
                }
                match files_in_dir(&project.item_data_dir(name)) {
                    Ok(files) => resources.files.extend(files),
                    Err(e) => warn!(item = %name, "failed to list data files: {}", e),
                }
            }
            ItemType::DataStore => match item.database_url(project.dir()) {
                Some(url) => {
                    resources.urls.insert(name.to_string(), url);
                }
                None => warn!(item = %name, "data store has no database URL"),
            },
            _ => {}
        }
        resources
    }

    async fn execute_tool(
        &self,
        project: &Project,
        name: &str,
        item: &ItemDict,
        inputs: &Resources,
        limiter: Option<&Semaphore>,
    ) -> (ItemOutcome, Resources) {
        let spec = match resolve_specification(project, name, item) {
            Ok(spec) => spec,
            Err(e) => {
                self.events.message(name, MessageLevel::Error, e.to_string());
                return (
                    ItemOutcome::with_message(ItemState::Failed, e.to_string()),
                    Resources::default(),
                );
            }
        };

        let mut record = RunRecord::new(project.dir(), name, &spec.name);
        self.save_record(&record).await;
        let result = self
            .run_tool(project, name, item, &spec, inputs, limiter, &mut record)
            .await;

        let (outcome, resources) = match result {
            Ok(outputs) => {
                self.events.message(
                    name,
                    MessageLevel::Success,
                    format!("Tool specification '{}' finished successfully", spec.name),
                );
                let outcome = ItemOutcome {
                    run_id: Some(record.id.clone()),
                    result_dir: record.result_dir.as_ref().map(PathBuf::from),
                    ..ItemOutcome::new(ItemState::Completed)
                };
                let resources = Resources {
                    files: outputs,
                    urls: BTreeMap::new(),
                };
                (outcome, resources)
            }
            Err(e) => {
                error!(item = %name, error = %e, "tool execution failed");
                self.events.message(name, MessageLevel::Error, e.to_string());
                record.fail(e.to_string());
                let outcome = ItemOutcome {
                    run_id: Some(record.id.clone()),
                    ..ItemOutcome::with_message(ItemState::Failed, e.to_string())
                };
                (outcome, Resources::default())
            }
        };
        self.save_record(&record).await;
        (outcome, resources)
    }

    /// Stage, run and archive one Tool. Returns the archived output files.
    #[allow(clippy::too_many_arguments)]
    async fn run_tool(
        &self,
        project: &Project,
        name: &str,
        item: &ItemDict,
        spec: &ToolSpecification,
        inputs: &Resources,
        limiter: Option<&Semaphore>,
        record: &mut RunRecord,
    ) -> Result<Vec<PathBuf>, ToolboxError> {
        let work_dir = if spec.execute_in_work {
            create_work_dir(spec, &self.settings.work_dir_root())?
        } else {
            spec.source_dir().ok_or_else(|| {
                ToolboxError::Staging(format!(
                    "specification '{}' has no source directory",
                    spec.name
                ))
            })?
        };
        record.work_dir = Some(work_dir.display().to_string());
        self.events.message(
            name,
            MessageLevel::Info,
            format!("Executing in {}", work_dir.display()),
        );

        let staged = stage_work_dir(spec, &work_dir, &inputs.files)?;
        let ctx = TagContext {
            optional_inputs: staged.optional,
            input_urls: inputs.urls.clone(),
        };
        let command = build_command(spec, &item.cmd_line_args(), &work_dir, &self.settings, &ctx)?;
        self.events
            .message(name, MessageLevel::Info, format!("Starting {}", command));

        let outcome = {
            let _permit = match limiter {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(anyhow::Error::from)?),
                None => None,
            };
            run_command(
                &command,
                self.settings.engine.execution_timeout_secs,
                name,
                &self.events,
            )
            .await?
        };
        record.finish(outcome.exit_code);

        if outcome.timed_out {
            return Err(ToolboxError::Execution {
                item_name: name.to_string(),
                message: "process timed out".to_string(),
            });
        }
        if !outcome.success() {
            let code = outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string());
            return Err(ToolboxError::Execution {
                item_name: name.to_string(),
                message: format!("process exited with code {}", code),
            });
        }

        let result_dir = create_result_dir(&project.item_data_dir(name).join("output"))?;
        let report = archive_outputs(spec, &work_dir, &result_dir)?;
        for missing in &report.missing {
            self.events.message(
                name,
                MessageLevel::Warning,
                format!("Output file '{}' was not produced", missing),
            );
        }
        record.result_dir = Some(result_dir.display().to_string());

        Ok(report.copied.into_iter().filter(|p| p.is_file()).collect())
    }

    async fn save_record(&self, record: &RunRecord) {
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(record).await {
                warn!(id = %record.id, "failed to save run record: {}", e);
            }
        }
    }
}

/// The item's specification with item level overrides applied
fn resolve_specification(
    project: &Project,
    name: &str,
    item: &ItemDict,
) -> Result<ToolSpecification, ToolboxError> {
    let spec_name = item.specification().ok_or_else(|| ToolboxError::Execution {
        item_name: name.to_string(),
        message: "no specification set".to_string(),
    })?;
    let mut spec = project
        .specifications
        .get(spec_name)
        .cloned()
        .ok_or_else(|| ToolboxError::Execution {
            item_name: name.to_string(),
            message: format!("specification '{}' not found", spec_name),
        })?;
    if let Some(execute_in_work) = item.execute_in_work() {
        spec.execute_in_work = execute_in_work;
    }
    Ok(spec)
}

fn unknown_items(project: &Project, request: &ExecutionRequest) -> Vec<String> {
    let mut unknown: Vec<String> = request
        .selected
        .iter()
        .chain(request.deselected.iter())
        .flatten()
        .filter(|name| project.item(name).is_none())
        .cloned()
        .collect();
    unknown.sort();
    unknown.dedup();
    unknown
}
