//! Master Pipeline: owns the processor registry and drives the
//! stage-sequencing surface the CLI and API are built on.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processor::{safe_process, ProcessingServices, Processor};
use crate::retry::{self, ScheduledRetry};
use crate::types::{ProcessingContext, ProcessingStatus, Stage, StageState, StageStatus, ALL_STAGES};

/// Hydrates a fresh [`ProcessingContext`] for `document_id` from whatever
/// durable state earlier stages have already written (the `documents` row,
/// `chunks`, `images`, `tables`, `error_codes`, …). A stage that needs
/// something the loader didn't populate fails with `Error::MissingInput`,
/// same as it would mid-run.
#[async_trait]
pub trait DocumentContextLoader: Send + Sync {
    async fn load_context(&self, document_id: Uuid) -> Result<ProcessingContext>;
}

/// The durable stage-status table: what `get_stage_status` reads and every
/// stage transition writes. Kept separate from the idempotency completion
/// marker, which is keyed by data hash rather than operator-facing state.
#[async_trait]
pub trait StageStatusStore: Send + Sync {
    async fn set(&self, status: StageStatus) -> Result<()>;

    /// Every row recorded for `document_id`, keyed by stage. A stage with no
    /// row is not represented — absence means `pending`.
    async fn all_for_document(&self, document_id: Uuid) -> Result<HashMap<Stage, StageStatus>>;
}

#[derive(Debug, Clone)]
pub struct StageRunOutcome {
    pub stage: Stage,
    pub success: bool,
    pub data: HashMap<String, serde_json::Value>,
    pub error: Option<String>,
    pub processing_time_s: f64,
}

#[derive(Debug, Clone)]
pub struct StagesRunSummary {
    pub total_stages: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f32,
    pub stage_results: Vec<StageRunOutcome>,
}

#[derive(Debug, Clone)]
pub struct StageStatusReport {
    pub found: bool,
    pub stage_status: HashMap<Stage, StageState>,
}

/// Stable topological sort of `stages` by `Stage::dependencies()`, considering
/// only dependencies that are themselves present in `stages` — a dependency
/// left out of the call is the caller's business, not something this
/// function can satisfy by inventing a run for it. Stages with no ordering
/// constraint between them keep their original relative order.
fn order_by_dependencies(stages: &[Stage]) -> Vec<Stage> {
    let present: std::collections::HashSet<Stage> = stages.iter().copied().collect();
    let mut done = vec![false; stages.len()];
    let mut placed: std::collections::HashSet<Stage> = std::collections::HashSet::new();
    let mut ordered = Vec::with_capacity(stages.len());

    while ordered.len() < stages.len() {
        let mut progressed = false;
        for (i, &stage) in stages.iter().enumerate() {
            if done[i] {
                continue;
            }
            let ready = stage.dependencies().iter().all(|dep| !present.contains(dep) || placed.contains(dep));
            if ready {
                ordered.push(stage);
                placed.insert(stage);
                done[i] = true;
                progressed = true;
            }
        }
        if !progressed {
            // A dependency cycle among the requested stages shouldn't happen
            // with the fixed stage graph; fall back to the caller's order.
            return stages.to_vec();
        }
    }
    ordered
}

/// Owns the stage registry and drives runs against it. Built once per
/// engine process and shared behind an `Arc` (or cloned directly: every
/// field is cheaply clonable).
#[derive(Clone)]
pub struct Pipeline {
    processors: HashMap<Stage, Arc<dyn Processor>>,
    services: ProcessingServices,
    context_loader: Arc<dyn DocumentContextLoader>,
    stage_status: Arc<dyn StageStatusStore>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        services: ProcessingServices,
        context_loader: Arc<dyn DocumentContextLoader>,
        stage_status: Arc<dyn StageStatusStore>,
    ) -> Self {
        Self {
            processors: HashMap::new(),
            services,
            context_loader,
            stage_status,
        }
    }

    /// Register a processor for the stage it declares. A second registration
    /// for the same stage replaces the first.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.stage(), processor);
    }

    fn processor_for(&self, stage: Stage) -> Result<&Arc<dyn Processor>> {
        self.processors
            .get(&stage)
            .ok_or_else(|| Error::ContractViolation(format!("no processor registered for stage {stage}")))
    }

    async fn run_one(&self, context: &mut ProcessingContext, stage: Stage) -> Result<StageRunOutcome> {
        let processor = self.processor_for(stage)?;
        context.correlation_id = retry::correlation_id(&context.request_id, stage, context.retry_attempt);

        self.stage_status
            .set(StageStatus {
                document_id: context.document_id,
                stage_name: stage.name().to_string(),
                status: StageState::InProgress,
                started_at: Some(Utc::now()),
                finished_at: None,
                error: None,
                progress: None,
            })
            .await?;

        let result = safe_process(&self.services, processor.as_ref(), context).await;

        let final_state = match result.status {
            ProcessingStatus::Completed if result.success => StageState::Completed,
            ProcessingStatus::InProgress => StageState::InProgress,
            _ => StageState::Failed,
        };
        self.stage_status
            .set(StageStatus {
                document_id: context.document_id,
                stage_name: stage.name().to_string(),
                status: final_state,
                started_at: None,
                finished_at: Some(Utc::now()),
                error: result.error.clone(),
                progress: None,
            })
            .await?;

        Ok(StageRunOutcome {
            stage,
            success: result.success,
            data: result.data,
            error: result.error,
            processing_time_s: result.processing_time_s,
        })
    }

    /// Hydrate `document_id`'s context from durable state without running a
    /// stage — the thumbnail/video API endpoints need the stored file path
    /// without driving the stage graph.
    pub async fn load_context(&self, document_id: Uuid) -> Result<ProcessingContext> {
        self.context_loader.load_context(document_id).await
    }

    /// Run exactly one stage for `document_id`, hydrating its context fresh
    /// from durable state.
    pub async fn run_single_stage(&self, document_id: Uuid, stage: Stage) -> Result<StageRunOutcome> {
        let mut context = self.context_loader.load_context(document_id).await?;
        self.run_one(&mut context, stage).await
    }

    /// Upload a new file: the one entry point that doesn't hydrate via
    /// `context_loader`, since no `documents` row exists yet for it to read.
    /// Mints a fresh `document_id` and runs `Stage::Upload` directly against
    /// a bare context carrying only `file_path`.
    pub async fn run_upload(&self, file_path: String) -> Result<StageRunOutcome> {
        let mut context = ProcessingContext::new(Uuid::new_v4(), Stage::Upload);
        context.file_path = Some(file_path);
        self.run_one(&mut context, Stage::Upload).await
    }

    /// Run `stages` against one shared, in-memory context: a later stage in
    /// this call observes whatever an earlier stage in the same call wrote
    /// (`context.manufacturer`, `context.chunks`, …), without a round trip
    /// through durable storage. `stop_on_error` short-circuits the remaining
    /// stages on the first failure.
    ///
    /// `stages` is reordered first via `Stage::dependencies()` so that, among
    /// the stages given, each runs only after whatever it depends on that is
    /// also in this call — `run_all_pending` gets this for free from
    /// `ALL_STAGES`' declared order, but an arbitrary caller-supplied slice no
    /// longer has to already be sorted. A dependency that isn't part of this
    /// call at all (not requested, and not durably completed) isn't added;
    /// the stage still runs and fails its own input validation, same as
    /// always.
    pub async fn run_stages(&self, document_id: Uuid, stages: &[Stage], stop_on_error: bool) -> Result<StagesRunSummary> {
        let ordered = order_by_dependencies(stages);
        let mut context = self.context_loader.load_context(document_id).await?;
        let mut stage_results = Vec::with_capacity(ordered.len());

        for stage in ordered {
            let outcome = self.run_one(&mut context, stage).await?;
            let failed = !outcome.success;
            stage_results.push(outcome);
            if failed && stop_on_error {
                break;
            }
        }

        let successful = stage_results.iter().filter(|r| r.success).count();
        let failed = stage_results.len() - successful;
        let success_rate = if stage_results.is_empty() {
            1.0
        } else {
            successful as f32 / stage_results.len() as f32
        };

        Ok(StagesRunSummary {
            total_stages: stage_results.len(),
            successful,
            failed,
            success_rate,
            stage_results,
        })
    }

    /// Read the durable stage-status table. `found` is false when no row
    /// exists yet for any stage of this document.
    pub async fn get_stage_status(&self, document_id: Uuid) -> Result<StageStatusReport> {
        let rows = self.stage_status.all_for_document(document_id).await?;
        if rows.is_empty() {
            return Ok(StageStatusReport {
                found: false,
                stage_status: HashMap::new(),
            });
        }
        let stage_status = ALL_STAGES
            .into_iter()
            .map(|stage| {
                let state = rows.get(&stage).map_or(StageState::Pending, |s| s.status);
                (stage, state)
            })
            .collect();
        Ok(StageStatusReport { found: true, stage_status })
    }

    /// Smart resume: every stage not yet `completed`, in declared order.
    pub async fn run_all_pending(&self, document_id: Uuid) -> Result<StagesRunSummary> {
        let report = self.get_stage_status(document_id).await?;
        let pending: Vec<Stage> = ALL_STAGES
            .into_iter()
            .filter(|stage| report.stage_status.get(stage).copied() != Some(StageState::Completed))
            .collect();
        self.run_stages(document_id, &pending, false).await
    }

    /// The callback a `BackgroundRetryQueue` fires into once a scheduled
    /// retry's delay elapses: re-hydrate the context, restore the attempt
    /// count and correlation id the retry was scheduled with, and run the
    /// one stage again through the same `safe_process` path.
    pub async fn on_background_retry(&self, retry: ScheduledRetry) {
        tracing::info!(
            document_id = %retry.document_id,
            stage = retry.stage.name(),
            attempt = retry.attempt,
            correlation_id = %retry.correlation_id,
            "background retry firing"
        );
        let mut context = match self.context_loader.load_context(retry.document_id).await {
            Ok(context) => context,
            Err(e) => {
                tracing::error!(error = %e, "background retry failed to hydrate context");
                return;
            }
        };
        context.retry_attempt = retry.attempt;
        context.correlation_id = retry.correlation_id;
        if let Err(e) = self.run_one(&mut context, retry.stage).await {
            tracing::error!(error = %e, "background retry failed to run stage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::CompletionMarkerStore;
    use crate::processor::ProcessingServices;
    use crate::retry::{AdvisoryLock, BackgroundRetryQueue};
    use crate::types::{ProcessingResult, StageCompletionMarker};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap as StdHashMap;

    struct NoopCompletionMarkers;
    #[async_trait]
    impl CompletionMarkerStore for NoopCompletionMarkers {
        async fn get_marker(&self, _document_id: Uuid, _stage_name: &str) -> Result<Option<StageCompletionMarker>> {
            Ok(None)
        }
        async fn set_marker(&self, _marker: StageCompletionMarker) -> Result<()> {
            Ok(())
        }
        async fn delete_marker(&self, _document_id: Uuid, _stage_name: &str) -> Result<()> {
            Ok(())
        }
    }

    struct AlwaysAcquireLock;
    #[async_trait]
    impl AdvisoryLock for AlwaysAcquireLock {
        async fn try_acquire(&self, _key: &str) -> Result<bool> {
            Ok(true)
        }
        async fn release(&self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    struct NoBackgroundRetries;
    #[async_trait]
    impl BackgroundRetryQueue for NoBackgroundRetries {
        async fn enqueue(&self, _retry: ScheduledRetry) -> Result<()> {
            Ok(())
        }
        async fn cancel_document(&self, _document_id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    struct NoopErrorLog;
    #[async_trait]
    impl crate::processor::ErrorLogStore for NoopErrorLog {
        async fn record(&self, _entry: crate::processor::ErrorLogEntry) -> Result<()> {
            Ok(())
        }
    }

    struct InMemoryStageStatusStore(Mutex<StdHashMap<(Uuid, String), StageStatus>>);
    impl InMemoryStageStatusStore {
        fn new() -> Self {
            Self(Mutex::new(StdHashMap::new()))
        }
    }
    #[async_trait]
    impl StageStatusStore for InMemoryStageStatusStore {
        async fn set(&self, status: StageStatus) -> Result<()> {
            self.0.lock().insert((status.document_id, status.stage_name.clone()), status);
            Ok(())
        }
        async fn all_for_document(&self, document_id: Uuid) -> Result<HashMap<Stage, StageStatus>> {
            let rows = self.0.lock();
            Ok(ALL_STAGES
                .into_iter()
                .filter_map(|stage| rows.get(&(document_id, stage.name().to_string())).cloned().map(|s| (stage, s)))
                .collect())
        }
    }

    struct FixedContextLoader(Uuid);
    #[async_trait]
    impl DocumentContextLoader for FixedContextLoader {
        async fn load_context(&self, document_id: Uuid) -> Result<ProcessingContext> {
            Ok(ProcessingContext::new(document_id, Stage::Upload))
        }
    }

    /// Marks classification ran by setting `context.manufacturer`.
    struct FakeClassification;
    #[async_trait]
    impl Processor for FakeClassification {
        fn name(&self) -> &'static str {
            "fake_classification"
        }
        fn stage(&self) -> Stage {
            Stage::Classification
        }
        async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
            context.manufacturer = Some("HP".to_string());
            Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), StdHashMap::new(), 0.0))
        }
    }

    /// Fails unless it can see `context.manufacturer` set by an earlier
    /// stage run in the same `run_stages` call.
    struct FakeSeriesDetection;
    #[async_trait]
    impl Processor for FakeSeriesDetection {
        fn name(&self) -> &'static str {
            "fake_series_detection"
        }
        fn stage(&self) -> Stage {
            Stage::SeriesDetection
        }
        async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult> {
            match &context.manufacturer {
                Some(m) => {
                    let mut data = StdHashMap::new();
                    data.insert("manufacturer".to_string(), serde_json::json!(m));
                    Ok(ProcessingResult::success(self.name(), context.correlation_id.clone(), data, 0.0))
                }
                None => Err(Error::InvalidInput("manufacturer not set".to_string())),
            }
        }
    }

    struct AlwaysFailsProcessor;
    #[async_trait]
    impl Processor for AlwaysFailsProcessor {
        fn name(&self) -> &'static str {
            "always_fails"
        }
        fn stage(&self) -> Stage {
            Stage::PartsExtraction
        }
        async fn process(&self, _context: &mut ProcessingContext) -> Result<ProcessingResult> {
            Err(Error::InvalidInput("permanently broken".to_string()))
        }
    }

    fn test_services() -> ProcessingServices {
        ProcessingServices::new(
            Arc::new(NoopCompletionMarkers) as Arc<dyn CompletionMarkerStore>,
            Arc::new(AlwaysAcquireLock),
            Arc::new(NoBackgroundRetries),
            Arc::new(NoopErrorLog),
        )
    }

    fn test_pipeline() -> Pipeline {
        let document_id = Uuid::new_v4();
        let mut pipeline = Pipeline::new(
            test_services(),
            Arc::new(FixedContextLoader(document_id)),
            Arc::new(InMemoryStageStatusStore::new()),
        );
        pipeline.register(Arc::new(FakeClassification));
        pipeline.register(Arc::new(FakeSeriesDetection));
        pipeline
    }

    #[tokio::test]
    async fn run_single_stage_runs_exactly_one_processor() {
        let pipeline = test_pipeline();
        let document_id = Uuid::new_v4();
        let outcome = pipeline.run_single_stage(document_id, Stage::Classification).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stage, Stage::Classification);
    }

    #[tokio::test]
    async fn run_single_stage_on_unregistered_stage_is_a_contract_violation() {
        let pipeline = test_pipeline();
        let err = pipeline.run_single_stage(Uuid::new_v4(), Stage::Embedding).await.unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
    }

    #[test]
    fn order_by_dependencies_reorders_a_backwards_slice() {
        let ordered = order_by_dependencies(&[Stage::SeriesDetection, Stage::Classification, Stage::MetadataExtraction]);
        assert_eq!(
            ordered,
            vec![Stage::Classification, Stage::MetadataExtraction, Stage::SeriesDetection]
        );
    }

    #[test]
    fn order_by_dependencies_ignores_a_dependency_not_in_the_slice() {
        // SeriesDetection depends on Classification and MetadataExtraction;
        // neither is requested here, so there's nothing to reorder against.
        let ordered = order_by_dependencies(&[Stage::SeriesDetection]);
        assert_eq!(ordered, vec![Stage::SeriesDetection]);
    }

    #[tokio::test]
    async fn run_stages_carries_state_from_an_earlier_stage_forward() {
        let pipeline = test_pipeline();
        let summary = pipeline
            .run_stages(Uuid::new_v4(), &[Stage::Classification, Stage::SeriesDetection], true)
            .await
            .unwrap();
        assert_eq!(summary.total_stages, 2);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.stage_results[1].data["manufacturer"], serde_json::json!("HP"));
    }

    #[tokio::test]
    async fn series_detection_alone_fails_without_classification_in_the_same_run() {
        let pipeline = test_pipeline();
        let summary = pipeline.run_stages(Uuid::new_v4(), &[Stage::SeriesDetection], true).await.unwrap();
        assert_eq!(summary.successful, 0);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn stop_on_error_short_circuits_remaining_stages() {
        let document_id = Uuid::new_v4();
        let mut pipeline = Pipeline::new(
            test_services(),
            Arc::new(FixedContextLoader(document_id)),
            Arc::new(InMemoryStageStatusStore::new()),
        );
        pipeline.register(Arc::new(FakeClassification));
        pipeline.register(Arc::new(AlwaysFailsProcessor));
        pipeline.register(Arc::new(FakeSeriesDetection));

        let summary = pipeline
            .run_stages(
                document_id,
                &[Stage::Classification, Stage::PartsExtraction, Stage::SeriesDetection],
                true,
            )
            .await
            .unwrap();
        assert_eq!(summary.total_stages, 2, "series_detection must not have run");
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn get_stage_status_reports_not_found_before_any_stage_runs() {
        let pipeline = test_pipeline();
        let report = pipeline.get_stage_status(Uuid::new_v4()).await.unwrap();
        assert!(!report.found);
    }

    #[tokio::test]
    async fn get_stage_status_reflects_completed_and_pending_stages() {
        let pipeline = test_pipeline();
        let document_id = Uuid::new_v4();
        pipeline.run_single_stage(document_id, Stage::Classification).await.unwrap();

        let report = pipeline.get_stage_status(document_id).await.unwrap();
        assert!(report.found);
        assert_eq!(report.stage_status[&Stage::Classification], StageState::Completed);
        assert_eq!(report.stage_status[&Stage::Upload], StageState::Pending);
    }

    #[tokio::test]
    async fn run_all_pending_skips_already_completed_stages() {
        let pipeline = test_pipeline();
        let document_id = Uuid::new_v4();
        pipeline.run_single_stage(document_id, Stage::Classification).await.unwrap();

        let summary = pipeline.run_all_pending(document_id).await.unwrap();
        assert!(summary
            .stage_results
            .iter()
            .all(|r| r.stage != Stage::Classification));
    }

    #[tokio::test]
    async fn run_upload_mints_a_fresh_document_id_and_runs_without_a_preloaded_context() {
        use crate::stages::UploadProcessor;
        use crate::storage::DocumentStore;
        use std::collections::HashMap as StdMap2;

        struct FakeDocumentStore(Mutex<StdMap2<String, Uuid>>);
        #[async_trait]
        impl DocumentStore for FakeDocumentStore {
            async fn find_by_hash(&self, file_hash: &str) -> Result<Option<Uuid>> {
                Ok(self.0.lock().get(file_hash).copied())
            }
            async fn insert(&self, document: crate::types::Document) -> Result<()> {
                self.0.lock().insert(document.file_hash, document.id);
                Ok(())
            }
        }

        let document_id = Uuid::new_v4();
        let mut pipeline = Pipeline::new(
            test_services(),
            Arc::new(FixedContextLoader(document_id)),
            Arc::new(InMemoryStageStatusStore::new()),
        );
        pipeline.register(Arc::new(UploadProcessor::new(Arc::new(FakeDocumentStore(Mutex::new(StdMap2::new()))))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"pipeline upload test").unwrap();

        let outcome = pipeline.run_upload(file.path().to_str().unwrap().to_string()).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.stage, Stage::Upload);
        assert!(outcome.data.contains_key("document_id"));
    }
}
