use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Soft-delete one reminder instance. Adding an id twice is a no-op.
pub fn add_deleted_instance(conn: &Connection, instance_id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO deleted_instances (instance_id) VALUES (?1)",
        params![instance_id],
    )?;
    Ok(())
}

/// Undo a soft delete. Returns whether the id was present.
pub fn remove_deleted_instance(conn: &Connection, instance_id: &str) -> Result<bool, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM deleted_instances WHERE instance_id = ?1",
        params![instance_id],
    )?;
    Ok(removed > 0)
}

pub fn get_deleted_instance_ids(conn: &Connection) -> Result<HashSet<String>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT instance_id FROM deleted_instances")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}
