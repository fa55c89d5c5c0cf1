use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::errors::PermissableError;
use crate::models::DbGrant;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, PermissableError> {
    let s = s.trim();

    // Try RFC3339 first (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Rows written by hand or by SQLite's CURRENT_TIMESTAMP: "YYYY-MM-DD HH:MM:SS"
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(PermissableError::internal(format!("invalid datetime: {}", s)))
}

fn text(row: &SqliteRow, column: &str) -> Result<String, PermissableError> {
    row.try_get(column)
        .map_err(|e| PermissableError::internal(format!("missing {}: {}", column, e)))
}

pub fn db_grant_from_row(row: &SqliteRow) -> Result<DbGrant, PermissableError> {
    let id = text(row, "id")?;
    let member_id = text(row, "member_id")?;
    let member_type = text(row, "member_type")?;
    let resource_id = text(row, "resource_id")?;
    let resource_type = text(row, "resource_type")?;
    let permission_name = text(row, "permission_name")?;
    let created_at = parse_datetime(&text(row, "created_at")?)?;
    let updated_at = parse_datetime(&text(row, "updated_at")?)?;

    Ok(DbGrant {
        id,
        member_id,
        member_type,
        resource_id,
        resource_type,
        permission_name,
        created_at,
        updated_at,
    })
}
