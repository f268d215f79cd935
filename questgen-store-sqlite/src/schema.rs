pub const RECORDS_TABLE: &str = "generation_records";
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_RECORDS_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS generation_records (\
    key TEXT PRIMARY KEY,\
    run_id TEXT NOT NULL,\
    template_id TEXT NOT NULL,\
    status TEXT NOT NULL,\
    fields_json TEXT,\
    quality_score REAL,\
    attempts INTEGER NOT NULL,\
    error TEXT,\
    updated_at TEXT NOT NULL\
)";

pub const CREATE_STATUS_INDEX_SQL: &str = "CREATE INDEX IF NOT EXISTS idx_generation_records_status \
    ON generation_records (status)";

pub const MIGRATION_STATEMENTS_SQL: [&str; 2] = [CREATE_RECORDS_TABLE_SQL, CREATE_STATUS_INDEX_SQL];

pub(crate) const UPSERT_RECORD_SQL: &str = "INSERT INTO generation_records \
    (key, run_id, template_id, status, fields_json, quality_score, attempts, error, updated_at) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
    ON CONFLICT(key) DO UPDATE SET \
    run_id = excluded.run_id,\
    template_id = excluded.template_id,\
    status = excluded.status,\
    fields_json = excluded.fields_json,\
    quality_score = excluded.quality_score,\
    attempts = excluded.attempts,\
    error = excluded.error,\
    updated_at = excluded.updated_at";

pub(crate) const SELECT_RECORD_SQL: &str = "SELECT \
    key, run_id, template_id, status, fields_json, quality_score, attempts, error, updated_at \
    FROM generation_records WHERE key = ?";

pub(crate) const COUNT_BY_STATUS_SQL: &str =
    "SELECT COUNT(*) FROM generation_records WHERE status = ?";
