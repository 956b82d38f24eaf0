//! Database Schema Definitions
//!
//! Versioned migrations for the queue database. Each migration is a list of
//! single statements applied in one transaction; later versions only ever add
//! to the schema so rows queued under an older version survive the upgrade.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Version 1: the pending request store with its two lookup paths
const MIGRATION_1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS pending_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        method TEXT NOT NULL,
        headers TEXT NOT NULL DEFAULT '{}',
        body_type TEXT,
        body TEXT,
        created_at INTEGER NOT NULL,
        retry_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_pending_created_at ON pending_requests (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_pending_url ON pending_requests (url)",
];

/// Version 2: key/value sync metadata (last successful drain)
const MIGRATION_2: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Schema migrations, in application order
pub const MIGRATIONS: &[(i32, &[&str])] = &[(1, MIGRATION_1), (2, MIGRATION_2)];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<(i32, &'static [&'static str])> {
    MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > current_version)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_version() {
        assert_eq!(CURRENT_SCHEMA_VERSION, 2);
        assert!(!needs_migration(CURRENT_SCHEMA_VERSION));
        assert!(needs_migration(0));
    }

    #[test]
    fn test_pending_migrations() {
        let versions = |current| {
            get_pending_migrations(current)
                .into_iter()
                .map(|(v, _)| v)
                .collect::<Vec<_>>()
        };
        assert_eq!(versions(0), vec![1, 2]);
        assert_eq!(versions(1), vec![2]);
        assert_eq!(versions(2), Vec::<i32>::new());
    }

    #[test]
    fn test_latest_migration_matches_version() {
        let last = MIGRATIONS.last().map(|(v, _)| *v);
        assert_eq!(last, Some(CURRENT_SCHEMA_VERSION));
    }
}
