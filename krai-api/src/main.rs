//! `krai-api` server binary: boots every storage adapter, wires all 15
//! stage processors into one [`Pipeline`], and serves the HTTP surface
//! defined in `routes.rs` with a Swagger UI alongside it.

mod error;
mod handlers;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

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

use krai_storage_cache::{CachingCompletionMarkerStore, RedbAdvisoryLock, RedbBackgroundRetryQueue, RedbCacheStore};
use krai_storage_db::{
    FilesystemObjectStore, LibsqlCatalogStore, LibsqlCompletionMarkerStore, LibsqlDocumentContextLoader,
    LibsqlDocumentReadinessStore, LibsqlDocumentStore, LibsqlEmbeddingSink, LibsqlErrorCodeSink, LibsqlErrorLogStore,
    LibsqlIndexingAnalyticsSink, LibsqlProcessingQueue, LibsqlRelationalStore, LibsqlSearchIndexCounts,
    LibsqlStageStatusStore, LibsqlStore, LibsqlTableSink,
};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::stages::run_stage,
        handlers::stages::run_stages,
        handlers::stages::list_stages,
        handlers::stages::stage_status,
        handlers::media::process_video,
        handlers::media::process_thumbnail,
    ),
    components(schemas(
        handlers::stages::StageRunResponse,
        handlers::stages::RunStagesRequest,
        handlers::stages::StagesRunResponse,
        handlers::stages::StageListEntry,
        handlers::stages::StageStatusResponse,
        handlers::media::ProcessVideoRequest,
        handlers::media::ProcessVideoResponse,
        handlers::media::ProcessThumbnailRequest,
        handlers::media::ProcessThumbnailResponse,
    )),
    tags(
        (name = "stages", description = "Per-stage and multi-stage pipeline control"),
        (name = "media", description = "Video and thumbnail enrichment"),
    ),
    info(
        title = "KRAI Engine API",
        version = "0.1.0",
        description = "Stage control and media enrichment over technical-PDF document processing"
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting krai-api");

    let config = EngineConfig::from_env();
    let database_url = config.require_database_url()?.to_string();
    let turso_token = std::env::var("DATABASE_AUTH_TOKEN").unwrap_or_default();

    let store = LibsqlStore::open(&database_url, &turso_token).await?;
    store.initialize_schema().await?;
    tracing::info!("database schema ready");

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
    let background_retries: Arc<dyn krai_core::retry::BackgroundRetryQueue> = Arc::new(RedbBackgroundRetryQueue::new(cache.clone()));
    let error_log: Arc<dyn krai_core::processor::ErrorLogStore> = Arc::new(LibsqlErrorLogStore::new(store.clone()));

    let services = ProcessingServices::new(completion_markers, advisory_lock, background_retries, error_log)
        .with_retry_config(RetryConfig::default());

    let context_loader: Arc<dyn krai_core::pipeline::DocumentContextLoader> =
        Arc::new(LibsqlDocumentContextLoader::new(store.clone()));
    let stage_status_store: Arc<dyn krai_core::pipeline::StageStatusStore> = Arc::new(LibsqlStageStatusStore::new(store.clone()));

    let ollama = Arc::new(
        OllamaClient::from_config(&config)
            .expect("OLLAMA_URL must be set for krai-api to run classification, embedding, vision and search"),
    );
    ollama.test_connection().await.map_err(|e| format!("cannot reach Ollama at OLLAMA_URL: {e}"))?;
    tracing::info!("Ollama connection verified");

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

    let state = AppState {
        pipeline: Arc::new(pipeline),
        config: Arc::new(config),
    };

    let app = axum::Router::new()
        .merge(routes::create_router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("krai-api listening on http://{addr}");
    tracing::info!("Swagger UI at http://{addr}/swagger-ui/");

    axum::serve(listener, app).await?;
    Ok(())
}
