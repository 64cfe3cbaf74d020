//! SQLite schema definitions for the swap database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Swap results and usage counters
// =============================================================================

/// One row per successful swap
const SWAP_RESULTS_TABLE_V1: Table = Table {
    name: "swap_results",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("user_name", &SqlType::Text, non_null = true),
        sqlite_column!("style_id", &SqlType::Text, non_null = true),
        sqlite_column!("style_name", &SqlType::Text, non_null = true),
        sqlite_column!("customer_image", &SqlType::Text, non_null = true),
        sqlite_column!("style_image", &SqlType::Text, non_null = true),
        sqlite_column!("result_image", &SqlType::Text, non_null = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("processing_time", &SqlType::Real, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_swap_results_user_created", "user_id, created_at DESC")],
};

/// Per-style usage counter
const STYLE_USAGE_TABLE_V1: Table = Table {
    name: "style_usage",
    columns: &[
        sqlite_column!("style_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("style_name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "ai_usage_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_used_at", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

/// Per-day swap counter, keyed by `YYYYMMDD`
const DAILY_USAGE_TABLE_V1: Table = Table {
    name: "daily_usage",
    columns: &[
        sqlite_column!("day", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "swap_count",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
};

// =============================================================================
// Version 2 - Global totals
// =============================================================================

/// Single-row table holding the overall counters
const USAGE_TOTALS_TABLE_V2: Table = Table {
    name: "usage_totals",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "total_swaps",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("last_used_at", &SqlType::Text),
    ],
    indices: &[],
};

/// Adds the totals table and seeds it from the existing results.
fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE usage_totals (
            id INTEGER PRIMARY KEY,
            total_swaps INTEGER NOT NULL DEFAULT 0,
            last_used_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "INSERT INTO usage_totals (id, total_swaps, last_used_at)
         SELECT 1, COUNT(*), MAX(created_at) FROM swap_results",
        [],
    )?;
    Ok(())
}

// =============================================================================
// Version 3 - Failed swaps
// =============================================================================

/// One row per swap that ended without a result image
const ERROR_LOGS_TABLE_V3: Table = Table {
    name: "error_logs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("error_kind", &SqlType::Text, non_null = true),
        sqlite_column!("message", &SqlType::Text, non_null = true),
        sqlite_column!("job_id", &SqlType::Text),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("style_id", &SqlType::Text, non_null = true),
        sqlite_column!("customer_image", &SqlType::Text, non_null = true),
        sqlite_column!("style_image", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_error_logs_created", "created_at DESC")],
};

fn migrate_v2_to_v3(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    ERROR_LOGS_TABLE_V3.create(conn)
}

pub const SWAP_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[
            SWAP_RESULTS_TABLE_V1,
            STYLE_USAGE_TABLE_V1,
            DAILY_USAGE_TABLE_V1,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[
            SWAP_RESULTS_TABLE_V1,
            STYLE_USAGE_TABLE_V1,
            DAILY_USAGE_TABLE_V1,
            USAGE_TOTALS_TABLE_V2,
        ],
        migration: Some(migrate_v1_to_v2),
    },
    VersionedSchema {
        version: 3,
        tables: &[
            SWAP_RESULTS_TABLE_V1,
            STYLE_USAGE_TABLE_V1,
            DAILY_USAGE_TABLE_V1,
            USAGE_TOTALS_TABLE_V2,
            ERROR_LOGS_TABLE_V3,
        ],
        migration: Some(migrate_v2_to_v3),
    },
];
