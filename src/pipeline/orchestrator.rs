//! Pipeline orchestration: request validation, the stage plan, and the
//! stage runner the worker pool executes.
//!
//! `submit` validates the request, stages the input into a private working
//! directory and enqueues the first stage; it never waits on the chain.
//! Each stage job runs on a worker and enqueues its successor with its own
//! `StageResult`, so a failure travels to the notification stage as data.

use crate::bio::fasta::count_sequences;
use crate::core::paths::request_dir;
use crate::core::{Config, ContainerStageConfig, Topology};
use crate::index::ReferenceDatabaseBuilder;
use crate::metadata::{CorpusSource, MetadataClient};
use crate::pipeline::aggregate::{Aggregator, Report};
use crate::pipeline::alignment::AlignmentEngine;
use crate::pipeline::annotation::AnnotationExecutor;
use crate::pipeline::filter::{join_branches, ResultFilter};
use crate::pipeline::notify::{DeliveryInfo, LogNotifier, Notifier, Outcome, OutboxNotifier};
use crate::pipeline::queue::{JobHandler, WorkerPool};
use crate::pipeline::stage::{Artifact, StageResult};
use crate::tools::{Aligner, BlastAligner, CliRuntime, ContainerRuntime};
use crate::PlasticomeError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

pub const ACKNOWLEDGEMENT: &str = "Analysis is in progress, the result will be sent by email";
const RESULTS_DIR: &str = "results";
const INPUT_DIR: &str = "input";

pub fn is_valid_email(email: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
            )
            .ok()
        })
        .as_ref()
        .map(|pattern| pattern.is_match(email.trim()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub user_email: String,
    #[serde(default)]
    pub user_name: String,
    /// Local protein FASTA to analyse
    #[serde(default)]
    pub sequence_source: Option<PathBuf>,
    #[serde(default)]
    pub organism_name: Option<String>,
}

impl AnalysisRequest {
    pub fn new(
        user_email: impl Into<String>,
        user_name: impl Into<String>,
        sequence_source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            user_email: user_email.into(),
            user_name: user_name.into(),
            sequence_source: Some(sequence_source.into()),
            organism_name: None,
        }
    }

    pub fn with_organism(mut self, name: impl Into<String>) -> Self {
        self.organism_name = Some(name.into());
        self
    }

    /// Missing fields are reported together, before the email format
    pub fn validate(&self) -> Result<(), PlasticomeError> {
        let mut missing = Vec::new();
        if self.user_email.trim().is_empty() {
            missing.push("user_email");
        }
        if self.user_name.trim().is_empty() {
            missing.push("user_name");
        }
        if self.sequence_source.is_none() {
            missing.push("sequence_source");
        }
        if !missing.is_empty() {
            return Err(PlasticomeError::Validation(format!(
                "Incomplete model, missing fields: {}",
                missing.join(", ")
            )));
        }
        if !is_valid_email(&self.user_email) {
            return Err(PlasticomeError::Validation(
                "You must send a valid email".to_string(),
            ));
        }
        Ok(())
    }

    fn delivery(&self) -> DeliveryInfo {
        DeliveryInfo {
            user_email: self.user_email.trim().to_string(),
            user_name: self.user_name.clone(),
            organism_name: self.organism_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub request_id: String,
    pub message: String,
}

/// An accepted request whose chain is running on the worker pool
pub struct PendingRun {
    pub acknowledgement: Acknowledgement,
    completion: oneshot::Receiver<Outcome>,
}

impl PendingRun {
    /// Wait for the notification stage to finish
    pub async fn wait(self) -> Result<Outcome, PlasticomeError> {
        self.completion.await.map_err(|_| {
            PlasticomeError::Pipeline(format!(
                "run {} ended without reaching notification",
                self.acknowledgement.request_id
            ))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Index into the configured annotation tools
    Annotate(usize),
    Filter(usize),
    Align,
    Aggregate,
    Notify,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Annotate(_) => write!(f, "annotate"),
            StageKind::Filter(_) => write!(f, "filter"),
            StageKind::Align => write!(f, "align"),
            StageKind::Aggregate => write!(f, "aggregate"),
            StageKind::Notify => write!(f, "notify"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
}

impl StageDescriptor {
    fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStep {
    Stage(StageDescriptor),
    /// Branches run side by side and join before the next step
    Parallel(Vec<Vec<StageDescriptor>>),
}

/// Ordered, inspectable list of stages; fixed per deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePlan {
    steps: Vec<PlanStep>,
}

impl PipelinePlan {
    pub fn new(tools: &[ContainerStageConfig], topology: Topology) -> Self {
        let branch = |idx: usize, tool: &ContainerStageConfig| {
            vec![
                StageDescriptor::new(tool.tool.name(), StageKind::Annotate(idx)),
                StageDescriptor::new(format!("{}_filter", tool.tool.name()), StageKind::Filter(idx)),
            ]
        };

        let mut steps = Vec::new();
        match topology {
            Topology::Sequential => {
                for (idx, tool) in tools.iter().enumerate() {
                    steps.extend(branch(idx, tool).into_iter().map(PlanStep::Stage));
                }
            }
            Topology::Parallel => {
                steps.push(PlanStep::Parallel(
                    tools.iter().enumerate().map(|(idx, tool)| branch(idx, tool)).collect(),
                ));
            }
        }
        steps.push(PlanStep::Stage(StageDescriptor::new("align", StageKind::Align)));
        steps.push(PlanStep::Stage(StageDescriptor::new("aggregate", StageKind::Aggregate)));
        steps.push(PlanStep::Stage(StageDescriptor::new("notify", StageKind::Notify)));
        Self { steps }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.annotation, config.pipeline.topology)
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Stage names in execution order; parallel branches are listed branch by branch
    pub fn stage_names(&self) -> Vec<String> {
        self.steps
            .iter()
            .flat_map(|step| match step {
                PlanStep::Stage(stage) => vec![stage.name.clone()],
                PlanStep::Parallel(branches) => branches.iter().flatten().map(|s| s.name.clone()).collect(),
            })
            .collect()
    }

    fn descriptor(&self, cursor: Cursor) -> Option<&StageDescriptor> {
        match (cursor, self.steps.get(cursor.step())?) {
            (Cursor::Step(_), PlanStep::Stage(stage)) => Some(stage),
            (Cursor::Branch { branch, position, .. }, PlanStep::Parallel(branches)) => {
                branches.get(branch)?.get(position)
            }
            _ => None,
        }
    }

    /// Jobs that start `step`; a parallel step opens its join slots
    fn entry_jobs(&self, run: &Arc<RunContext>, step: usize, input: StageResult<Artifact>) -> Vec<Job> {
        match self.steps.get(step) {
            None => Vec::new(),
            Some(PlanStep::Stage(_)) => vec![Job {
                run: run.clone(),
                cursor: Cursor::Step(step),
                input,
            }],
            Some(PlanStep::Parallel(branches)) => {
                run.joins.lock().insert(step, vec![None; branches.len()]);
                (0..branches.len())
                    .map(|branch| Job {
                        run: run.clone(),
                        cursor: Cursor::Branch {
                            step,
                            branch,
                            position: 0,
                        },
                        input: input.clone(),
                    })
                    .collect()
            }
        }
    }

    fn branch_len(&self, step: usize, branch: usize) -> usize {
        match self.steps.get(step) {
            Some(PlanStep::Parallel(branches)) => branches.get(branch).map(Vec::len).unwrap_or(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    Step(usize),
    Branch {
        step: usize,
        branch: usize,
        position: usize,
    },
}

impl Cursor {
    fn step(&self) -> usize {
        match self {
            Cursor::Step(step) | Cursor::Branch { step, .. } => *step,
        }
    }
}

/// State shared by every job of one run
struct RunContext {
    request_id: String,
    delivery: DeliveryInfo,
    work_dir: PathBuf,
    results_dir: PathBuf,
    joins: Mutex<HashMap<usize, Vec<Option<StageResult<Artifact>>>>>,
    completion: Mutex<Option<oneshot::Sender<Outcome>>>,
    span: Span,
}

pub struct Job {
    run: Arc<RunContext>,
    cursor: Cursor,
    input: StageResult<Artifact>,
}

/// Executes stage jobs for the worker pool
struct StageRunner {
    plan: Arc<PipelinePlan>,
    stages: Arc<Stages>,
}

/// Stage implementations shared by every stage task
struct Stages {
    annotators: Vec<AnnotationExecutor>,
    filters: Vec<ResultFilter>,
    engine: AlignmentEngine,
    aggregator: Aggregator,
    notifiers: Vec<Arc<dyn Notifier>>,
}

#[async_trait]
impl JobHandler<Job> for StageRunner {
    async fn handle(&self, job: Job) -> Vec<Job> {
        let Job { run, cursor, input } = job;
        let Some(stage) = self.plan.descriptor(cursor).cloned() else {
            warn!(request_id = %run.request_id, ?cursor, "No stage at cursor; dropping job");
            return Vec::new();
        };

        let span = info_span!(parent: &run.span, "stage", stage = %stage.name);
        let task = {
            let stages = self.stages.clone();
            let run = run.clone();
            let stage = stage.clone();
            tokio::spawn(async move { stages.run_stage(&stage, &run, input).await }.instrument(span))
        };
        let output = match task.await {
            Ok(output) => output,
            // The notification stage owns the completion channel; nothing to hand on
            Err(e) if stage.kind == StageKind::Notify => {
                error!(request_id = %run.request_id, error = %e, "Notification stage aborted");
                None
            }
            Err(e) => {
                error!(request_id = %run.request_id, stage = %stage.name, error = %e, "Stage aborted");
                Some(StageResult::failure(&stage.name, format!("stage aborted: {}", e)))
            }
        };
        match output {
            Some(output) => self.advance(&run, cursor, output),
            None => Vec::new(),
        }
    }
}

impl Stages {
    /// Run one stage. `None` means the run is finished.
    async fn run_stage(
        &self,
        stage: &StageDescriptor,
        run: &RunContext,
        input: StageResult<Artifact>,
    ) -> Option<StageResult<Artifact>> {
        let name = stage.name.as_str();
        let output = match stage.kind {
            StageKind::Annotate(idx) => {
                let source = input.expect_artifact(name, "sequence file", |artifact| match artifact {
                    Artifact::Input { sequence_file } => Ok(Some(sequence_file)),
                    Artifact::Filtered(filtered) => Ok(Some(filtered.sequence_file)),
                    Artifact::NoFindings => Ok(None),
                    other => Err(other),
                });
                match (source, self.annotators.get(idx)) {
                    (StageResult::Failure(failure), _) => StageResult::Failure(failure),
                    (StageResult::Success(None), _) => StageResult::Success(Artifact::NoFindings),
                    (StageResult::Success(Some(path)), Some(annotator)) => annotator
                        .execute(StageResult::Success(path))
                        .await
                        .map(Artifact::Annotated),
                    (StageResult::Success(Some(_)), None) => {
                        StageResult::failure(name, "no such annotation tool")
                    }
                }
            }
            StageKind::Filter(idx) => {
                let annotated = input.expect_artifact(name, "annotation output", |artifact| match artifact {
                    Artifact::Annotated(output) => Ok(Some(output)),
                    Artifact::NoFindings => Ok(None),
                    other => Err(other),
                });
                match (annotated, self.filters.get(idx)) {
                    (StageResult::Failure(failure), _) => StageResult::Failure(failure),
                    (StageResult::Success(None), _) => StageResult::Success(Artifact::NoFindings),
                    (StageResult::Success(Some(output)), Some(filter)) => filter
                        .filter(StageResult::Success(output))
                        .await
                        .map(|filtered| {
                            if filtered.records.is_empty() {
                                info!("No annotation survived filtering");
                                Artifact::NoFindings
                            } else {
                                Artifact::Filtered(filtered)
                            }
                        }),
                    (StageResult::Success(Some(_)), None) => {
                        StageResult::failure(name, "no such result filter")
                    }
                }
            }
            StageKind::Align => {
                let filtered = input.expect_artifact(name, "filtered annotations", |artifact| match artifact {
                    Artifact::Filtered(filtered) => Ok(Some(filtered)),
                    Artifact::NoFindings => Ok(None),
                    other => Err(other),
                });
                match filtered {
                    StageResult::Success(None) => StageResult::Success(Artifact::NoFindings),
                    StageResult::Success(Some(filtered)) => self
                        .engine
                        .align(StageResult::Success(filtered), &run.results_dir)
                        .await
                        .map(Artifact::Aligned),
                    StageResult::Failure(failure) => StageResult::Failure(failure),
                }
            }
            StageKind::Aggregate => {
                let aligned = input.expect_artifact(name, "alignment table", |artifact| match artifact {
                    Artifact::Aligned(aligned) => Ok(Some(aligned)),
                    Artifact::NoFindings => Ok(None),
                    other => Err(other),
                });
                self.aggregator
                    .aggregate(aligned, &run.results_dir)
                    .await
                    .map(Artifact::Report)
            }
            StageKind::Notify => {
                let result = input.expect_artifact(name, "report", |artifact| match artifact {
                    Artifact::Report(report) => Ok(report),
                    other => Err(other),
                });
                self.notify(run, result).await;
                return None;
            }
        };

        if let StageResult::Failure(failure) = &output {
            if failure.stage == name {
                warn!(stage = name, "Stage failed: {}", failure.message);
            }
        } else {
            info!("Stage finished");
        }
        Some(output)
    }

    async fn notify(&self, run: &RunContext, result: StageResult<Report>) {
        let mut outcome = Outcome {
            request_id: run.request_id.clone(),
            delivery: run.delivery.clone(),
            result,
            work_dir: run.work_dir.clone(),
            finished_at: Utc::now(),
        };

        for notifier in &self.notifiers {
            if let Err(e) = notifier.deliver(&mut outcome).await {
                warn!(notifier = notifier.name(), error = %e, "Notification failed");
            }
        }

        let sender = run.completion.lock().take();
        if let Some(sender) = sender {
            // Nobody waiting is fine
            let _ = sender.send(outcome);
        }
    }

}

impl StageRunner {
    /// Successor jobs for a finished stage
    fn advance(&self, run: &Arc<RunContext>, cursor: Cursor, output: StageResult<Artifact>) -> Vec<Job> {
        match cursor {
            Cursor::Step(step) => self.plan.entry_jobs(run, step + 1, output),
            Cursor::Branch {
                step,
                branch,
                position,
            } => {
                if position + 1 < self.plan.branch_len(step, branch) {
                    return vec![Job {
                        run: run.clone(),
                        cursor: Cursor::Branch {
                            step,
                            branch,
                            position: position + 1,
                        },
                        input: output,
                    }];
                }

                let completed = {
                    let mut joins = run.joins.lock();
                    let Some(slots) = joins.get_mut(&step) else {
                        warn!(request_id = %run.request_id, step, "Branch finished without a join slot");
                        return Vec::new();
                    };
                    if let Some(slot) = slots.get_mut(branch) {
                        *slot = Some(output);
                    }
                    if slots.iter().all(Option::is_some) {
                        joins.remove(&step)
                    } else {
                        None
                    }
                };

                match completed {
                    Some(slots) => {
                        let joined = join_artifacts(slots.into_iter().flatten().collect());
                        self.plan.entry_jobs(run, step + 1, joined)
                    }
                    None => Vec::new(),
                }
            }
        }
    }
}

/// Join finished branches in declared order
fn join_artifacts(branches: Vec<StageResult<Artifact>>) -> StageResult<Artifact> {
    const STAGE: &str = "join";
    let mut filtered = Vec::with_capacity(branches.len());
    let mut no_findings = false;
    for branch in branches {
        match branch {
            StageResult::Failure(failure) => return StageResult::Failure(failure),
            StageResult::Success(Artifact::Filtered(output)) => filtered.push(StageResult::Success(output)),
            StageResult::Success(Artifact::NoFindings) => no_findings = true,
            StageResult::Success(other) => {
                return StageResult::failure(STAGE, format!("cannot join {}", other.kind()))
            }
        }
    }
    if no_findings {
        return StageResult::Success(Artifact::NoFindings);
    }
    join_branches(STAGE, filtered).map(|joined| {
        if joined.records.is_empty() {
            Artifact::NoFindings
        } else {
            Artifact::Filtered(joined)
        }
    })
}

/// Assembles an `Orchestrator`; collaborators not supplied are built from the config
pub struct OrchestratorBuilder {
    config: Config,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    aligner: Option<Arc<dyn Aligner>>,
    corpus: Option<Arc<dyn CorpusSource>>,
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl OrchestratorBuilder {
    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_aligner(mut self, aligner: Arc<dyn Aligner>) -> Self {
        self.aligner = Some(aligner);
        self
    }

    pub fn with_corpus_source(mut self, corpus: Arc<dyn CorpusSource>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    /// Replaces the default log + outbox notifiers
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Start the worker pool. Must be called within a tokio runtime.
    pub fn build(self) -> Result<Orchestrator, PlasticomeError> {
        let config = self.config;
        config.validate()?;

        let corpus: Arc<dyn CorpusSource> = match self.corpus {
            Some(corpus) => corpus,
            None => Arc::new(MetadataClient::new(config.metadata.clone())?),
        };
        let aligner: Arc<dyn Aligner> = match self.aligner {
            Some(aligner) => aligner,
            None => Arc::new(BlastAligner::new(&config.alignment)),
        };
        let notifiers = if self.notifiers.is_empty() {
            vec![
                Arc::new(LogNotifier) as Arc<dyn Notifier>,
                Arc::new(OutboxNotifier::new(
                    config.outbox_dir(),
                    config.pipeline.cleanup_after_delivery,
                )),
            ]
        } else {
            self.notifiers
        };

        let builder = Arc::new(ReferenceDatabaseBuilder::new(config.database_dir(), aligner.clone()));
        match builder.cleanup_temp_dirs() {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Removed interrupted database builds"),
            Err(e) => warn!(error = %e, "Could not clean interrupted database builds"),
        }

        let annotators = config
            .annotation
            .iter()
            .map(|stage| {
                let runtime = match &self.runtime {
                    Some(runtime) => runtime.clone(),
                    None => Arc::new(CliRuntime::new(&stage.runtime)) as Arc<dyn ContainerRuntime>,
                };
                AnnotationExecutor::new(stage.clone(), runtime)
            })
            .collect();
        let filters = config
            .annotation
            .iter()
            .map(|stage| ResultFilter::new(stage.clone(), corpus.clone()))
            .collect();

        let plan = Arc::new(PipelinePlan::from_config(&config));
        let runner = StageRunner {
            plan: plan.clone(),
            stages: Arc::new(Stages {
                annotators,
                filters,
                engine: AlignmentEngine::new(builder, aligner, corpus.clone()),
                aggregator: Aggregator::new(corpus),
                notifiers,
            }),
        };

        let workers = config.worker_count();
        let pool = WorkerPool::spawn(workers, Arc::new(runner));
        info!(workers, stages = ?plan.stage_names(), "Pipeline ready");

        Ok(Orchestrator {
            work_root: config.work_dir(),
            config,
            plan,
            pool,
        })
    }
}

pub struct Orchestrator {
    config: Config,
    plan: Arc<PipelinePlan>,
    pool: WorkerPool<Job>,
    work_root: PathBuf,
}

impl Orchestrator {
    pub fn builder(config: Config) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            runtime: None,
            aligner: None,
            corpus: None,
            notifiers: Vec::new(),
        }
    }

    pub fn from_config(config: Config) -> Result<Self, PlasticomeError> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// Validate, stage the input and enqueue the first stage.
    /// Validation and input errors are returned here; stage failures only
    /// reach the notifiers.
    pub fn submit(&self, request: AnalysisRequest) -> Result<PendingRun, PlasticomeError> {
        request.validate()?;
        let source = request
            .sequence_source
            .as_deref()
            .ok_or_else(|| PlasticomeError::Validation("Incomplete model, missing fields: sequence_source".to_string()))?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let work_dir = request_dir(&self.work_root, &request_id);
        let sequence_file = match stage_input(source, &work_dir) {
            Ok(path) => path,
            Err(e) => {
                // Nothing has been scheduled; leave no trace of the request
                let _ = std::fs::remove_dir_all(&work_dir);
                return Err(e);
            }
        };

        let (sender, completion) = oneshot::channel();
        let run = Arc::new(RunContext {
            request_id: request_id.clone(),
            delivery: request.delivery(),
            results_dir: work_dir.join(RESULTS_DIR),
            work_dir,
            joins: Mutex::new(HashMap::new()),
            completion: Mutex::new(Some(sender)),
            span: info_span!("analysis", request_id = %request_id),
        });

        for job in self.plan.entry_jobs(&run, 0, StageResult::Success(Artifact::Input { sequence_file })) {
            self.pool.enqueue(job)?;
        }
        run.span.in_scope(|| info!(recipient = %run.delivery.user_email, "Analysis accepted"));

        Ok(PendingRun {
            acknowledgement: Acknowledgement {
                request_id,
                message: ACKNOWLEDGEMENT.to_string(),
            },
            completion,
        })
    }

    /// Submit and wait for the terminal result
    pub async fn run(&self, request: AnalysisRequest) -> Result<Outcome, PlasticomeError> {
        self.submit(request)?.wait().await
    }

    /// Let every accepted run finish, then stop the workers
    pub async fn shutdown(self) {
        let pending = self.pool.in_flight();
        if pending > 0 {
            info!(pending, "Waiting for running analyses");
        }
        self.pool.drain().await;
        debug!("Worker pool drained");
    }
}

/// Copy the input into `<work_dir>/input/`
fn stage_input(source: &Path, work_dir: &Path) -> Result<PathBuf, PlasticomeError> {
    if !source.is_file() {
        return Err(PlasticomeError::InputAcquisition(format!(
            "sequence file {} not found",
            source.display()
        )));
    }
    let sequences = count_sequences(source)
        .map_err(|e| PlasticomeError::InputAcquisition(format!("cannot read {}: {}", source.display(), e)))?;
    if sequences == 0 {
        return Err(PlasticomeError::InputAcquisition(format!(
            "{} contains no sequences",
            source.display()
        )));
    }

    let name = source
        .file_name()
        .ok_or_else(|| PlasticomeError::InputAcquisition("sequence source has no file name".to_string()))?;
    let input_dir = work_dir.join(INPUT_DIR);
    std::fs::create_dir_all(&input_dir)?;
    let target = input_dir.join(name);
    std::fs::copy(source, &target)
        .map_err(|e| PlasticomeError::InputAcquisition(format!("cannot copy {}: {}", source.display(), e)))?;
    Ok(target)
}
