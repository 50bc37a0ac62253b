//! The `Processor` capability and the non-inherited `safe_process`
//! coordinator that wraps any `Processor` with idempotency, advisory
//! locking, and the hybrid retry policy.
//!
//! The original groups this behavior into a `BaseProcessor` superclass that
//! every stage inherits from. A `Processor` capability plus a free
//! `safe_process` function is preferred here: it hoists the safe-process
//! behavior out of an inheritance hierarchy so any stage-shaped type — or a
//! test double — can be run through it without subclassing anything.

mod services;

pub use services::{ErrorLogEntry, ErrorLogStore, ProcessingServices};

use crate::error::{Classification, Error, Result};
use crate::idempotency::{self, IdempotencyDecision};
use crate::retry::{self, LockGuard, RetryDecision, ScheduledRetry};
use crate::types::{ProcessingContext, ProcessingResult, ProcessingStatus, Stage, StageCompletionMarker};
use async_trait::async_trait;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// One stage's behavior. Implementors declare their shape (`required_inputs`,
/// `output_tables`) so the Master Pipeline can order runs and validate inputs
/// without a hardcoded switch statement.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Stable processor name, used in `ProcessingResult::processor` and logs.
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    /// Stages that must already be completed (durably, or earlier in the same
    /// `run_stages` call) before this one may run. Defaults to
    /// [`Stage::dependencies`] for `self.stage()`; override only if a
    /// processor's real prerequisites differ from its stage's declared ones.
    fn dependencies(&self) -> &'static [Stage] {
        self.stage().dependencies()
    }

    /// Context fields that must be populated before `process` is called.
    /// `safe_process` validates these and returns a permanent
    /// [`Error::MissingInput`] if any are absent.
    fn required_inputs(&self) -> &'static [&'static str] {
        &[]
    }

    /// Logical tables this processor writes to, surfaced for operational
    /// tooling and the pipeline's dependency resolution.
    fn output_tables(&self) -> &'static [&'static str] {
        &[]
    }

    /// Run the stage. `context` carries both inputs and, on success, is
    /// expected to be mutated with whatever downstream stages need.
    async fn process(&self, context: &mut ProcessingContext) -> Result<ProcessingResult>;
}

fn validate_required_inputs(processor: &dyn Processor, context: &ProcessingContext) -> Result<()> {
    for input in processor.required_inputs() {
        let present = match *input {
            "file_path" => context.file_path.is_some(),
            "file_hash" => context.file_hash.is_some(),
            "page_texts" => context.page_texts.is_some(),
            "chunks" => context.chunks.as_ref().is_some_and(|c| !c.is_empty()),
            "images" => context.images.is_some(),
            other => context.processing_config.contains_key(other),
        };
        if !present {
            return Err(Error::MissingInput((*input).to_string()));
        }
    }
    Ok(())
}

/// Wrap `processor.process` with the full safe-process contract: idempotency
/// short-circuit, advisory lock acquisition, input validation, execution,
/// completion-marker write, and the hybrid retry policy on failure.
///
/// `context` is taken by mutable reference rather than by value: a
/// multi-stage run (the Master Pipeline's `run_stages`) threads the same
/// context through several stages in sequence, and each stage's writes
/// (`context.manufacturer`, `context.chunks`, …) must be visible to the
/// next.
pub async fn safe_process(
    services: &ProcessingServices,
    processor: &dyn Processor,
    context: &mut ProcessingContext,
) -> ProcessingResult {
    let stage = processor.stage();
    let span = tracing::info_span!(
        "safe_process",
        processor = processor.name(),
        document_id = %context.document_id,
        stage = stage.name(),
        correlation_id = %context.correlation_id,
    );
    run(services, processor, context)
        .instrument(span)
        .await
}

async fn run(
    services: &ProcessingServices,
    processor: &dyn Processor,
    context: &mut ProcessingContext,
) -> ProcessingResult {
    let stage = processor.stage();

    // Phase C: stage-level idempotency short-circuit.
    match idempotency::check(services.completion_markers.as_ref(), context, stage.name()).await {
        Ok(IdempotencyDecision::SkipAlreadyProcessed) => {
            tracing::info!("stage already processed with matching data hash, skipping");
            return ProcessingResult::skipped_already_processed(
                processor.name(),
                context.correlation_id.clone(),
            );
        }
        Ok(IdempotencyDecision::Run { stale: Some(marker) }) => {
            tracing::info!(
                old_hash = %marker.data_hash,
                "data hash changed since last completion, cleaning up stale marker"
            );
            if let Err(e) = services
                .completion_markers
                .delete_marker(context.document_id, stage.name())
                .await
            {
                tracing::warn!(error = %e, "failed to delete stale completion marker");
            }
        }
        Ok(IdempotencyDecision::Run { stale: None }) => {}
        Err(e) => {
            return ProcessingResult::failed(processor.name(), context.correlation_id.clone(), e.to_string(), 0.0);
        }
    }

    // Phase D: advisory lock. On a retry attempt, failure to acquire means
    // another process already owns the retry.
    let key = retry::lock_key(context.document_id, stage);
    let acquired = match services.advisory_lock.try_acquire(&key).await {
        Ok(acquired) => acquired,
        Err(e) => {
            return ProcessingResult::failed(processor.name(), context.correlation_id.clone(), e.to_string(), 0.0);
        }
    };
    if !acquired {
        if context.retry_attempt > 0 {
            tracing::info!("lock held by another process, retry already in progress");
            return ProcessingResult::retrying(processor.name(), context.correlation_id.clone());
        }
        return ProcessingResult::failed(
            processor.name(),
            context.correlation_id.clone(),
            Error::LockContention(key).to_string(),
            0.0,
        );
    }
    let guard = LockGuard::new(key, services.advisory_lock.as_ref());

    let result = execute_and_classify(services, processor, context).await;

    if let Err(e) = guard.release().await {
        tracing::warn!(error = %e, "failed to release advisory lock");
    }

    result
}

async fn execute_and_classify(
    services: &ProcessingServices,
    processor: &dyn Processor,
    context: &mut ProcessingContext,
) -> ProcessingResult {
    if let Err(e) = validate_required_inputs(processor, context) {
        return ProcessingResult::failed(processor.name(), context.correlation_id.clone(), e.to_string(), 0.0);
    }

    let started = Instant::now();
    let outcome = processor.process(context).await;
    let elapsed = started.elapsed().as_secs_f64();

    match outcome {
        Ok(mut result) => {
            result.processing_time_s = elapsed;
            let marker = StageCompletionMarker {
                document_id: context.document_id,
                stage_name: processor.stage().name().to_string(),
                completed_at: chrono::Utc::now(),
                data_hash: idempotency::compute_data_hash(context),
                metadata: serde_json::json!({
                    "processing_time_s": elapsed,
                    "retry_attempt": context.retry_attempt,
                    "correlation_id": context.correlation_id,
                }),
            };
            if let Err(e) = services.completion_markers.set_marker(marker).await {
                tracing::warn!(error = %e, "failed to persist completion marker");
            }
            result
        }
        Err(e) => handle_failure(services, processor, context, e, elapsed).await,
    }
}

async fn handle_failure(
    services: &ProcessingServices,
    processor: &dyn Processor,
    context: &mut ProcessingContext,
    error: Error,
    elapsed: f64,
) -> ProcessingResult {
    let error_id = Uuid::new_v4();
    let stage = processor.stage();
    let classification = error.classify();

    services
        .error_log
        .record(crate::processor::services::ErrorLogEntry {
            error_id,
            correlation_id: context.correlation_id.clone(),
            stage,
            document_id: context.document_id,
            classification,
            retry_attempt: context.retry_attempt,
            message: error.to_string(),
        })
        .await
        .unwrap_or_else(|e| tracing::warn!(error = %e, "failed to record error_log entry"));

    if classification != Classification::Transient {
        tracing::warn!(error = %error, classification = %classification, "stage failed, not retrying");
        return ProcessingResult::failed(processor.name(), context.correlation_id.clone(), error.to_string(), elapsed);
    }

    match services.retry_config.decision(context.retry_attempt) {
        RetryDecision::SyncRetry { delay } => {
            tracing::warn!(error = %error, ?delay, "transient failure, retrying synchronously");
            tokio::time::sleep(delay).await;
            let mut retried = context.for_retry_attempt(stage, context.retry_attempt + 1);
            // `run`'s advisory lock guard for this document/stage is still held by
            // our caller (released only after `handle_failure` returns), so retrying
            // through `run` would always fail to reacquire it. Retry `process`
            // directly instead — we already hold the lock this attempt needs.
            let result = Box::pin(execute_and_classify(services, processor, &mut retried)).await;
            *context = retried;
            result
        }
        RetryDecision::BackgroundRetry { delay } => {
            let next_attempt = context.retry_attempt + 1;
            let correlation_id = retry::correlation_id(&context.request_id, stage, next_attempt);
            tracing::warn!(
                error = %error,
                ?delay,
                %correlation_id,
                "transient failure, scheduling background retry"
            );
            let scheduled = ScheduledRetry {
                document_id: context.document_id,
                stage,
                attempt: next_attempt,
                correlation_id: correlation_id.clone(),
                delay,
            };
            if let Err(e) = services.background_retries.enqueue(scheduled).await {
                tracing::error!(error = %e, "failed to enqueue background retry, falling back to sync retry");
                tokio::time::sleep(delay).await;
                let mut retried = context.for_retry_attempt(stage, next_attempt);
                let result = Box::pin(execute_and_classify(services, processor, &mut retried)).await;
                *context = retried;
                return result;
            }
            ProcessingResult::retrying(processor.name(), correlation_id)
        }
        RetryDecision::GiveUp => {
            tracing::error!(error = %error, "max retries exhausted, giving up");
            ProcessingResult::failed(processor.name(), context.correlation_id.clone(), error.to_string(), elapsed)
        }
    }
}
