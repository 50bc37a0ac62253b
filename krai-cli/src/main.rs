//! Operator CLI for the KRAI engine: upload a document, drive one or more
//! stages, smart-resume a partially-processed one, or inspect status.
//! Deliberately flag-based rather than a subcommand tree — one document,
//! one action, per invocation.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use uuid::Uuid;

use krai_core::chunker::SmartChunker;
use krai_core::classification::{
    ClassificationProcessor, MetadataExtractionProcessor, NoopProductDiscovery, PartsExtractionProcessor,
    SeriesDetectionProcessor,
};
use krai_core::config::EngineConfig;
use krai_core::embedding::EmbeddingStage;
use krai_core::extraction::{DefaultPdfExtractor, NoopOcr, OcrEngine};
use krai_core::media::context::{ContextExtractor, DEFAULT_CONTEXT_WINDOW};
use krai_core::media::image::{ImageStage, NoopRasterImageExtractor};
use krai_core::media::svg::{NoopPdfRegionRenderer, NoopVectorGraphicsExtractor, SvgStage, SvgStageConfig, UsvgRasterizer};
use krai_core::media::table::{NoopTableExtractor, TableStage};
use krai_core::ollama::OllamaClient;
use krai_core::pipeline::Pipeline;
use krai_core::processor::ProcessingServices;
use krai_core::retry::RetryConfig;
use krai_core::search::SearchIndexingStage;
use krai_core::stages::{
    ChunkPreprocessingProcessor, ImageProcessingProcessor, LinkExtractionProcessor, StorageProcessor,
    SvgProcessingProcessor, TableExtractionProcessor, TextExtractionProcessor, UploadProcessor,
    VisualEmbeddingProcessor,
};
use krai_core::storage::StorageStage;
use krai_core::types::{Stage, ALL_STAGES};

use krai_storage_cache::{CachingCompletionMarkerStore, RedbAdvisoryLock, RedbBackgroundRetryQueue, RedbCacheStore};
use krai_storage_db::{
    FilesystemObjectStore, LibsqlCatalogStore, LibsqlCompletionMarkerStore, LibsqlDocumentContextLoader,
    LibsqlDocumentReadinessStore, LibsqlDocumentStore, LibsqlEmbeddingSink, LibsqlErrorCodeSink, LibsqlErrorLogStore,
    LibsqlIndexingAnalyticsSink, LibsqlProcessingQueue, LibsqlRelationalStore, LibsqlSearchIndexCounts,
    LibsqlStageStatusStore, LibsqlStore, LibsqlTableSink,
};

/// Exit code for bad arguments, a missing file, an unknown stage, or an
/// upload the engine rejected outright.
const EXIT_USER_ERROR: u8 = 1;
/// Exit code for a failure inside the engine itself once arguments checked out.
const EXIT_ENGINE_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "krai", about = "Operator CLI for the KRAI document-understanding engine")]
struct Cli {
    /// Print the 15 pipeline stages in order and exit.
    #[arg(long)]
    list_stages: bool,

    /// Upload a PDF (or .pdfz) and print the new document id.
    #[arg(long, value_name = "PDF")]
    file_path: Option<PathBuf>,

    /// Target an existing document for --stage, --stages, or --smart.
    #[arg(long, value_name = "UUID")]
    document_id: Option<Uuid>,

    /// Run a single stage, by name or 1-based number.
    #[arg(long, value_name = "NAME|NUMBER")]
    stage: Option<String>,

    /// Run multiple stages in order, comma-separated, by name or number.
    #[arg(long, value_name = "CSV", value_delimiter = ',')]
    stages: Option<Vec<String>>,

    /// Re-run only the stages that have not yet completed.
    #[arg(long)]
    smart: bool,

    /// Print per-stage status for a document and exit.
    #[arg(long, value_name = "UUID")]
    status: Option<Uuid>,
}

fn error_exit_code(error: &krai_core::error::Error) -> u8 {
    use krai_core::error::Error;
    match error {
        Error::MissingInput(_) | Error::InvalidInput(_) | Error::ContractViolation(_) => EXIT_USER_ERROR,
        _ => EXIT_ENGINE_FAILURE,
    }
}

/// What a parsed, argument-validated invocation will do. Built from `Cli`
/// without touching the engine, so bad arguments fail before anything tries
/// to reach the database or Ollama.
enum Action {
    ListStages,
    Status(Uuid),
    Upload(PathBuf),
    RunStage(Uuid, Stage),
    RunStages(Uuid, Vec<Stage>),
    RunSmart(Uuid),
}

fn resolve_action(cli: &Cli) -> Result<Action, ExitCode> {
    if cli.list_stages {
        return Ok(Action::ListStages);
    }
    if let Some(document_id) = cli.status {
        return Ok(Action::Status(document_id));
    }
    if let Some(file_path) = &cli.file_path {
        if let Some(stage) = &cli.stage {
            match parse_stage_or_exit(stage)? {
                Stage::Upload => {}
                other => {
                    eprintln!("error: --stage with --file-path must be 'upload', got '{}'", other.name());
                    return Err(ExitCode::from(EXIT_USER_ERROR));
                }
            }
        }
        if !file_path.is_file() {
            eprintln!("error: file not found: {}", file_path.display());
            return Err(ExitCode::from(EXIT_USER_ERROR));
        }
        return Ok(Action::Upload(file_path.clone()));
    }

    let Some(document_id) = cli.document_id else {
        eprintln!("error: one of --list-stages, --file-path, --status, or --document-id is required");
        return Err(ExitCode::from(EXIT_USER_ERROR));
    };

    match (&cli.stage, &cli.stages, cli.smart) {
        (Some(stage), None, false) => Ok(Action::RunStage(document_id, parse_stage_or_exit(stage)?)),
        (None, Some(names), false) => {
            let stages = names.iter().map(|n| parse_stage_or_exit(n)).collect::<Result<Vec<_>, _>>()?;
            Ok(Action::RunStages(document_id, stages))
        }
        (None, None, true) => Ok(Action::RunSmart(document_id)),
        (None, None, false) => {
            eprintln!("error: --document-id requires one of --stage, --stages, or --smart");
            Err(ExitCode::from(EXIT_USER_ERROR))
        }
        _ => {
            eprintln!("error: --stage, --stages, and --smart are mutually exclusive");
            Err(ExitCode::from(EXIT_USER_ERROR))
        }
    }
}

fn parse_stage_or_exit(raw: &str) -> Result<Stage, ExitCode> {
    Stage::parse_name_or_number(raw).ok_or_else(|| {
        eprintln!("error: unknown stage '{raw}'");
        ExitCode::from(EXIT_USER_ERROR)
    })
}

async fn build_pipeline() -> Result<Pipeline, Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env();
    let database_url = config.require_database_url()?.to_string();
    let turso_token = std::env::var("DATABASE_AUTH_TOKEN").unwrap_or_default();

    let store = LibsqlStore::open(&database_url, &turso_token).await?;
    store.initialize_schema().await?;

    let redb_path = std::env::var("REDB_CACHE_PATH").unwrap_or_else(|_| "./data/krai_cache.redb".to_string());
    if let Some(parent) = PathBuf::from(&redb_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = RedbCacheStore::open(&PathBuf::from(&redb_path))?;

    let object_store_root = std::env::var("OBJECT_STORAGE_ROOT").unwrap_or_else(|_| "./data/objects".to_string());
    let object_store: Arc<dyn krai_core::storage::ObjectStore> =
        Arc::new(FilesystemObjectStore::new(object_store_root, config.object_storage.public_url_base.clone()));

    let document_store: Arc<dyn krai_core::storage::DocumentStore> = Arc::new(LibsqlDocumentStore::new(store.clone()));
    let relational_store: Arc<dyn krai_core::storage::RelationalStore> = Arc::new(LibsqlRelationalStore::new(store.clone()));
    let processing_queue: Arc<dyn krai_core::storage::ProcessingQueueStore> = Arc::new(LibsqlProcessingQueue::new(store.clone()));
    let catalog_store: Arc<dyn krai_core::classification::CatalogStore> = Arc::new(LibsqlCatalogStore::new(store.clone()));
    let error_code_sink: Arc<dyn krai_core::classification::ErrorCodeSink> = Arc::new(LibsqlErrorCodeSink::new(store.clone()));
    let table_sink: Arc<dyn krai_core::stages::TableSink> = Arc::new(LibsqlTableSink::new(store.clone()));
    let embedding_sink: Arc<dyn krai_core::embedding::EmbeddingSink> = Arc::new(LibsqlEmbeddingSink::new(store.clone()));

    let completion_markers: Arc<dyn krai_core::idempotency::CompletionMarkerStore> = Arc::new(CachingCompletionMarkerStore::new(
        cache.clone(),
        Arc::new(LibsqlCompletionMarkerStore::new(store.clone())),
    ));
    let advisory_lock: Arc<dyn krai_core::retry::AdvisoryLock> = Arc::new(RedbAdvisoryLock::new(cache.clone()));
    let background_retries: Arc<dyn krai_core::retry::BackgroundRetryQueue> = Arc::new(RedbBackgroundRetryQueue::new(cache));
    let error_log: Arc<dyn krai_core::processor::ErrorLogStore> = Arc::new(LibsqlErrorLogStore::new(store.clone()));

    let services = ProcessingServices::new(completion_markers, advisory_lock, background_retries, error_log)
        .with_retry_config(RetryConfig::default());

    let context_loader: Arc<dyn krai_core::pipeline::DocumentContextLoader> =
        Arc::new(LibsqlDocumentContextLoader::new(store.clone()));
    let stage_status_store: Arc<dyn krai_core::pipeline::StageStatusStore> = Arc::new(LibsqlStageStatusStore::new(store.clone()));

    let ollama = Arc::new(
        OllamaClient::from_config(&config)
            .expect("OLLAMA_URL must be set for krai to run classification, embedding, vision and search"),
    );

    let mut pipeline = Pipeline::new(services, context_loader, stage_status_store);

    pipeline.register(Arc::new(UploadProcessor::new(document_store)));

    let ocr: Box<dyn OcrEngine> = Box::new(NoopOcr);
    let text_extractor = Arc::new(DefaultPdfExtractor::new(config.pdf_engine, config.enable_ocr_fallback, ocr));
    pipeline.register(Arc::new(TextExtractionProcessor::new(text_extractor)));

    pipeline.register(Arc::new(ChunkPreprocessingProcessor::new(SmartChunker::new(config.chunker))));

    let context_extractor =
        ContextExtractor::new(DEFAULT_CONTEXT_WINDOW, config.enable_context_extraction, config.enable_context_extraction);
    pipeline.register(Arc::new(LinkExtractionProcessor::new(context_extractor, processing_queue.clone())));

    pipeline.register(Arc::new(ClassificationProcessor::new(ollama.clone(), Arc::new(NoopProductDiscovery))));
    pipeline.register(Arc::new(MetadataExtractionProcessor::new(Some(error_code_sink))));
    pipeline.register(Arc::new(PartsExtractionProcessor::new(catalog_store.clone())));
    pipeline.register(Arc::new(SeriesDetectionProcessor::new(catalog_store)));

    let image_stage = ImageStage::new(Arc::new(NoopRasterImageExtractor), context_extractor);
    pipeline.register(Arc::new(ImageProcessingProcessor::new(image_stage, processing_queue.clone())));

    if config.enable_svg_extraction {
        let svg_stage = SvgStage::new(
            Arc::new(NoopVectorGraphicsExtractor),
            Arc::new(UsvgRasterizer),
            Arc::new(NoopPdfRegionRenderer),
            context_extractor,
            SvgStageConfig {
                dpi: 150,
                inline_storage_threshold_bytes: config.svg_inline_storage_threshold_kb * 1024,
                disable_vision_processing: config.disable_vision_processing,
            },
        );
        pipeline.register(Arc::new(SvgProcessingProcessor::new(svg_stage, processing_queue.clone(), object_store.clone())));
    }

    if config.enable_table_extraction {
        let table_stage = TableStage::new(Arc::new(NoopTableExtractor), context_extractor);
        pipeline.register(Arc::new(TableExtractionProcessor::new(table_stage, Some(table_sink))));
    }

    if !config.disable_vision_processing {
        pipeline.register(Arc::new(VisualEmbeddingProcessor::new(processing_queue.clone(), ollama.clone(), embedding_sink.clone())));
    }

    pipeline.register(Arc::new(StorageProcessor::new(StorageStage::new(object_store, relational_store), processing_queue)));

    pipeline.register(Arc::new(EmbeddingStage::new(ollama, embedding_sink, config.embedding)));

    pipeline.register(Arc::new(SearchIndexingStage::new(
        Arc::new(LibsqlSearchIndexCounts::new(store.clone())),
        Arc::new(LibsqlDocumentReadinessStore::new(store.clone())),
        Arc::new(LibsqlIndexingAnalyticsSink::new(store)),
    )));

    Ok(pipeline)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    let action = match resolve_action(&cli) {
        Ok(action) => action,
        Err(code) => return code,
    };

    if matches!(action, Action::ListStages) {
        for stage in ALL_STAGES {
            println!("{:>2}  {}", stage.number(), stage.name());
        }
        return ExitCode::SUCCESS;
    }

    let pipeline = match build_pipeline().await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("error: failed to start engine: {e}");
            return ExitCode::from(EXIT_ENGINE_FAILURE);
        }
    };

    match action {
        Action::ListStages => unreachable!("handled above"),
        Action::Status(document_id) => match pipeline.get_stage_status(document_id).await {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&to_json_status(document_id, &report)).unwrap());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(error_exit_code(&e))
            }
        },
        Action::Upload(file_path) => {
            let Some(path_str) = file_path.to_str() else {
                eprintln!("error: --file-path is not valid UTF-8");
                return ExitCode::from(EXIT_USER_ERROR);
            };
            match pipeline.run_upload(path_str.to_string()).await {
                Ok(outcome) if outcome.success => {
                    let document_id = outcome.data.get("document_id").and_then(|v| v.as_str()).unwrap_or_default();
                    println!("{document_id}");
                    ExitCode::SUCCESS
                }
                Ok(outcome) => {
                    eprintln!("error: upload rejected: {}", outcome.error.unwrap_or_default());
                    ExitCode::from(EXIT_USER_ERROR)
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(error_exit_code(&e))
                }
            }
        }
        Action::RunStage(document_id, stage) => match pipeline.run_single_stage(document_id, stage).await {
            Ok(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome)).unwrap());
                if outcome.success { ExitCode::SUCCESS } else { ExitCode::from(EXIT_ENGINE_FAILURE) }
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(error_exit_code(&e))
            }
        },
        Action::RunStages(document_id, stages) => match pipeline.run_stages(document_id, &stages, true).await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary_json(&summary)).unwrap());
                if summary.failed > 0 { ExitCode::from(EXIT_ENGINE_FAILURE) } else { ExitCode::SUCCESS }
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(error_exit_code(&e))
            }
        },
        Action::RunSmart(document_id) => match pipeline.run_all_pending(document_id).await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary_json(&summary)).unwrap());
                if summary.failed > 0 { ExitCode::from(EXIT_ENGINE_FAILURE) } else { ExitCode::SUCCESS }
            }
            Err(e) => {
                eprintln!("error: {e}");
                ExitCode::from(error_exit_code(&e))
            }
        },
    }
}

fn to_json_status(document_id: Uuid, report: &krai_core::pipeline::StageStatusReport) -> serde_json::Value {
    let stage_status: std::collections::HashMap<String, String> = report
        .stage_status
        .iter()
        .map(|(stage, state)| (stage.name().to_string(), format!("{state:?}").to_lowercase()))
        .collect();
    serde_json::json!({
        "document_id": document_id,
        "found": report.found,
        "stage_status": stage_status,
    })
}

fn outcome_json(outcome: &krai_core::pipeline::StageRunOutcome) -> serde_json::Value {
    serde_json::json!({
        "success": outcome.success,
        "stage": outcome.stage.name(),
        "processing_time": outcome.processing_time_s,
        "data": outcome.data,
        "error": outcome.error,
    })
}

fn summary_json(summary: &krai_core::pipeline::StagesRunSummary) -> serde_json::Value {
    serde_json::json!({
        "total_stages": summary.total_stages,
        "successful": summary.successful,
        "failed": summary.failed,
        "success_rate": summary.success_rate,
        "stage_results": summary.stage_results.iter().map(outcome_json).collect::<Vec<_>>(),
    })
}
