use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::DoseStatus;
use crate::models::{dose_status_key, DoseStatusRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record the latest status of one dose of one instance (last write wins).
pub fn set_dose_status(
    conn: &Connection,
    instance_id: &str,
    dose_id: &str,
    status: DoseStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO dose_history (instance_id, dose_id, status, last_updated)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(instance_id, dose_id) DO UPDATE SET
             status = excluded.status,
             last_updated = excluded.last_updated",
        params![
            instance_id,
            dose_id,
            status.as_str(),
            Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_dose_status(
    conn: &Connection,
    instance_id: &str,
    dose_id: &str,
) -> Result<Option<DoseStatus>, DatabaseError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM dose_history WHERE instance_id = ?1 AND dose_id = ?2",
            params![instance_id, dose_id],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| DoseStatus::from_str(&s)).transpose()
}

/// Status lookup keyed `{instance_id}-{dose_id}`, as the expander consumes it.
/// Rows with an unknown status are skipped.
pub fn get_dose_status_map(conn: &Connection) -> Result<HashMap<String, DoseStatus>, DatabaseError> {
    let records = get_dose_history_records(conn)?;
    Ok(records
        .into_iter()
        .map(|record| (record.key(), record.status))
        .collect())
}

/// All dose history rows, oldest update first. Rows with an unknown status are skipped.
pub fn get_dose_history_records(conn: &Connection) -> Result<Vec<DoseStatusRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT instance_id, dose_id, status, last_updated
         FROM dose_history ORDER BY last_updated ASC, instance_id, dose_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (instance_id, dose_id, status, last_updated) = row?;
        let Ok(status) = DoseStatus::from_str(&status) else {
            tracing::warn!(
                key = %dose_status_key(&instance_id, &dose_id),
                status = %status,
                "Ignoring dose history row with unknown status"
            );
            continue;
        };
        records.push(DoseStatusRecord {
            instance_id,
            dose_id,
            status,
            last_updated: last_updated
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn missing_status_is_none() {
        let conn = open_memory_database().unwrap();
        assert_eq!(get_dose_status(&conn, "m-2024-01-01", "d").unwrap(), None);
    }

    #[test]
    fn last_write_wins() {
        let conn = open_memory_database().unwrap();
        set_dose_status(&conn, "m-2024-01-01", "d", DoseStatus::Taken).unwrap();
        set_dose_status(&conn, "m-2024-01-01", "d", DoseStatus::Skipped).unwrap();

        assert_eq!(
            get_dose_status(&conn, "m-2024-01-01", "d").unwrap(),
            Some(DoseStatus::Skipped)
        );
        assert_eq!(get_dose_history_records(&conn).unwrap().len(), 1);
    }

    #[test]
    fn status_map_uses_composite_key() {
        let conn = open_memory_database().unwrap();
        set_dose_status(&conn, "m-2024-01-01", "am", DoseStatus::Taken).unwrap();
        set_dose_status(&conn, "m-2024-01-02", "am", DoseStatus::Skipped).unwrap();

        let map = get_dose_status_map(&conn).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["m-2024-01-01-am"], DoseStatus::Taken);
        assert_eq!(map["m-2024-01-02-am"], DoseStatus::Skipped);
    }

    #[test]
    fn records_carry_timestamp() {
        let conn = open_memory_database().unwrap();
        set_dose_status(&conn, "m-2024-01-01", "am", DoseStatus::Taken).unwrap();
        let records = get_dose_history_records(&conn).unwrap();
        assert!(records[0].last_updated.is_some());
    }

    #[test]
    fn unknown_status_rows_are_skipped() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO dose_history (instance_id, dose_id, status) VALUES ('m-x', 'd', 'TAKEN')",
            [],
        )
        .unwrap();
        set_dose_status(&conn, "m-y", "d", DoseStatus::Taken).unwrap();

        let map = get_dose_status_map(&conn).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("m-y-d"));
        assert!(get_dose_status(&conn, "m-x", "d").is_err());
    }
}
