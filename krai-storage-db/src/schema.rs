//! `CREATE TABLE IF NOT EXISTS` statements for every logical table the
//! engine persists state to. Run once, in this order, by
//! [`crate::store::LibsqlStore::initialize_schema`].

pub const CREATE_DOCUMENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    file_hash TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    page_count INTEGER,
    manufacturer TEXT,
    model TEXT,
    document_type TEXT NOT NULL,
    language TEXT,
    version TEXT,
    status TEXT NOT NULL,
    search_ready INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub const CREATE_CHUNKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    text TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    page_start INTEGER NOT NULL,
    page_end INTEGER NOT NULL,
    chunk_type TEXT NOT NULL,
    metadata TEXT NOT NULL,
    UNIQUE (document_id, fingerprint)
)
"#;

pub const CREATE_STRUCTURED_TABLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS structured_tables (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    markdown TEXT NOT NULL,
    rows TEXT NOT NULL,
    cols INTEGER NOT NULL,
    bbox TEXT,
    context_text TEXT
)
"#;

pub const CREATE_UNIFIED_EMBEDDINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS unified_embeddings (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    source_id TEXT NOT NULL,
    source_type TEXT NOT NULL,
    vector TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (source_id, source_type)
)
"#;

pub const CREATE_IMAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    storage_url TEXT NOT NULL,
    filename TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    bbox TEXT,
    image_type TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    context_caption TEXT,
    related_error_codes TEXT NOT NULL,
    related_products TEXT NOT NULL,
    svg_storage_url TEXT,
    has_png_derivative INTEGER NOT NULL,
    UNIQUE (document_id, file_hash)
)
"#;

pub const CREATE_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    url TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    context_description TEXT,
    related_error_codes TEXT NOT NULL,
    related_products TEXT NOT NULL,
    UNIQUE (document_id, url)
)
"#;

pub const CREATE_VIDEOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    url TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    context_description TEXT,
    related_error_codes TEXT NOT NULL,
    related_products TEXT NOT NULL,
    platform TEXT NOT NULL,
    youtube_id TEXT,
    metadata TEXT NOT NULL,
    UNIQUE (platform, youtube_id),
    UNIQUE (document_id, url)
)
"#;

pub const CREATE_MANUFACTURERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS manufacturers (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE
)
"#;

pub const CREATE_PRODUCT_SERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS product_series (
    id TEXT PRIMARY KEY NOT NULL,
    manufacturer_id TEXT NOT NULL,
    series_name TEXT NOT NULL,
    model_pattern TEXT NOT NULL,
    UNIQUE (manufacturer_id, series_name, model_pattern)
)
"#;

pub const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY NOT NULL,
    manufacturer_id TEXT NOT NULL,
    model_number TEXT NOT NULL,
    series_id TEXT,
    UNIQUE (manufacturer_id, model_number)
)
"#;

pub const CREATE_PARTS_CATALOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS parts_catalog (
    id TEXT PRIMARY KEY NOT NULL,
    part_number TEXT NOT NULL,
    manufacturer_id TEXT NOT NULL,
    name TEXT,
    description TEXT NOT NULL,
    category TEXT,
    UNIQUE (part_number, manufacturer_id)
)
"#;

pub const CREATE_ERROR_CODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS error_codes (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    chunk_id TEXT,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    solution TEXT,
    page_number INTEGER NOT NULL,
    confidence REAL NOT NULL,
    severity TEXT NOT NULL,
    extraction_method TEXT NOT NULL,
    requires_technician INTEGER NOT NULL,
    requires_parts INTEGER NOT NULL
)
"#;

pub const CREATE_ERROR_CODE_PARTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS error_code_parts (
    error_code_id TEXT NOT NULL,
    part_id TEXT NOT NULL,
    relevance_score REAL NOT NULL,
    extraction_source TEXT NOT NULL,
    PRIMARY KEY (error_code_id, part_id)
)
"#;

pub const CREATE_PROCESSING_QUEUE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS processing_queue (
    id TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

pub const CREATE_STAGE_COMPLETION_MARKERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_completion_markers (
    document_id TEXT NOT NULL,
    stage_name TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    data_hash TEXT NOT NULL,
    metadata TEXT NOT NULL,
    PRIMARY KEY (document_id, stage_name)
)
"#;

pub const CREATE_STAGE_STATUS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stage_status (
    document_id TEXT NOT NULL,
    stage_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    error TEXT,
    progress REAL,
    PRIMARY KEY (document_id, stage_name)
)
"#;

pub const CREATE_ERROR_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS error_log (
    error_id TEXT PRIMARY KEY NOT NULL,
    correlation_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    document_id TEXT NOT NULL,
    classification TEXT NOT NULL,
    retry_attempt INTEGER NOT NULL,
    message TEXT NOT NULL,
    logged_at TEXT NOT NULL
)
"#;

pub const CREATE_SEARCH_ANALYTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS search_analytics (
    document_id TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    chunks INTEGER NOT NULL,
    embeddings INTEGER NOT NULL,
    links INTEGER NOT NULL,
    videos INTEGER NOT NULL,
    processing_time_s REAL NOT NULL
)
"#;

pub const CREATE_DOCUMENT_FINGERPRINTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS document_fingerprints (
    file_hash TEXT PRIMARY KEY NOT NULL,
    document_id TEXT NOT NULL
)
"#;

pub const CREATE_IMAGES_DOCUMENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_images_document_id ON images(document_id)
"#;

pub const CREATE_CHUNKS_DOCUMENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)
"#;

pub const CREATE_EMBEDDINGS_DOCUMENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON unified_embeddings(document_id)
"#;

pub const CREATE_ERROR_CODES_DOCUMENT_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_error_codes_document_id ON error_codes(document_id)
"#;

/// Every statement, in dependency order (no table references a not-yet-
/// created one by foreign key, so order only matters for readability here).
pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_DOCUMENTS_TABLE,
    CREATE_CHUNKS_TABLE,
    CREATE_STRUCTURED_TABLES_TABLE,
    CREATE_UNIFIED_EMBEDDINGS_TABLE,
    CREATE_IMAGES_TABLE,
    CREATE_LINKS_TABLE,
    CREATE_VIDEOS_TABLE,
    CREATE_MANUFACTURERS_TABLE,
    CREATE_PRODUCT_SERIES_TABLE,
    CREATE_PRODUCTS_TABLE,
    CREATE_PARTS_CATALOG_TABLE,
    CREATE_ERROR_CODES_TABLE,
    CREATE_ERROR_CODE_PARTS_TABLE,
    CREATE_PROCESSING_QUEUE_TABLE,
    CREATE_STAGE_COMPLETION_MARKERS_TABLE,
    CREATE_STAGE_STATUS_TABLE,
    CREATE_ERROR_LOG_TABLE,
    CREATE_SEARCH_ANALYTICS_TABLE,
    CREATE_DOCUMENT_FINGERPRINTS_TABLE,
    CREATE_IMAGES_DOCUMENT_INDEX,
    CREATE_CHUNKS_DOCUMENT_INDEX,
    CREATE_EMBEDDINGS_DOCUMENT_INDEX,
    CREATE_ERROR_CODES_DOCUMENT_INDEX,
];
