//! SQL schema for the Warden SQLite store.
//!
//! Executed once at store startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Local projection of the relationships shown in assessment sharing views.
-- Rows are mirrored from the graph engine, which stays authoritative.
CREATE TABLE IF NOT EXISTS relationships (
    relation_id   TEXT PRIMARY KEY,   -- digest of the engine tuple
    assessment_id TEXT,
    created_at    TEXT NOT NULL,      -- ISO 8601 UTC
    relation_type TEXT NOT NULL,      -- 'owner' | 'viewer' | 'editor' | 'org'
    subject_id    TEXT NOT NULL,      -- caller-facing id, not the digest
    subject_type  TEXT NOT NULL       -- 'user' | 'org' | 'platform'
);

CREATE INDEX IF NOT EXISTS relationships_assessment_idx ON relationships(assessment_id);

-- Latest consistency token returned by the graph engine. Single row.
CREATE TABLE IF NOT EXISTS zed_token (
    id    INTEGER PRIMARY KEY CHECK (id = 1),
    token TEXT NOT NULL
);

PRAGMA user_version = 1;
";
