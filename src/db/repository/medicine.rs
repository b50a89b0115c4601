use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::{ActiveDays, DoseSlot, MedicineDefinition};

pub fn insert_medicine(conn: &Connection, med: &MedicineDefinition) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO medicines (id, name, dosage, days_of_week, start_date, end_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            med.id,
            med.name,
            med.dosage,
            med.days.to_storage(),
            med.start_date,
            med.end_date,
        ],
    )?;
    insert_dose_slots(&tx, &med.id, &med.doses)?;
    tx.commit()?;
    Ok(())
}

/// Overwrite a stored medicine. The dose-slot list is replaced wholesale.
pub fn replace_medicine(conn: &Connection, med: &MedicineDefinition) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE medicines
         SET name = ?2, dosage = ?3, days_of_week = ?4, start_date = ?5, end_date = ?6,
             updated_at = datetime('now')
         WHERE id = ?1",
        params![
            med.id,
            med.name,
            med.dosage,
            med.days.to_storage(),
            med.start_date,
            med.end_date,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "medicine".into(),
            id: med.id.clone(),
        });
    }
    tx.execute(
        "DELETE FROM dose_slots WHERE medicine_id = ?1",
        params![med.id],
    )?;
    insert_dose_slots(&tx, &med.id, &med.doses)?;
    tx.commit()?;
    Ok(())
}

fn insert_dose_slots(
    conn: &Connection,
    medicine_id: &str,
    doses: &[DoseSlot],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO dose_slots (medicine_id, id, time, position) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, dose) in doses.iter().enumerate() {
        stmt.execute(params![medicine_id, dose.id, dose.time, position as i64])?;
    }
    Ok(())
}

pub fn get_medicine(conn: &Connection, id: &str) -> Result<Option<MedicineDefinition>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, dosage, days_of_week, start_date, end_date
             FROM medicines WHERE id = ?1",
            params![id],
            medicine_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(row) => {
            let doses = get_dose_slots(conn, &row.id)?;
            Ok(Some(medicine_from_row(row, doses)))
        }
        None => Ok(None),
    }
}

/// Every stored medicine in insertion order, dose slots in their saved order.
pub fn list_medicines(conn: &Connection) -> Result<Vec<MedicineDefinition>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, dosage, days_of_week, start_date, end_date
         FROM medicines ORDER BY rowid ASC",
    )?;
    let rows = stmt
        .query_map([], medicine_row_from_rusqlite)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut doses_by_medicine = get_all_dose_slots(conn)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let doses = doses_by_medicine.remove(&row.id).unwrap_or_default();
            medicine_from_row(row, doses)
        })
        .collect())
}

/// The medicine owning a dose slot. Dose ids are generated per slot, so the
/// first owner found is the only one in practice.
pub fn find_medicine_by_dose(
    conn: &Connection,
    dose_id: &str,
) -> Result<Option<MedicineDefinition>, DatabaseError> {
    let medicine_id: Option<String> = conn
        .query_row(
            "SELECT medicine_id FROM dose_slots WHERE id = ?1 ORDER BY rowid LIMIT 1",
            params![dose_id],
            |row| row.get(0),
        )
        .optional()?;

    match medicine_id {
        Some(id) => get_medicine(conn, &id),
        None => Ok(None),
    }
}

/// Hard delete; dose slots cascade. Returns whether a row was removed.
pub fn delete_medicine(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let removed = conn.execute("DELETE FROM medicines WHERE id = ?1", params![id])?;
    Ok(removed > 0)
}

pub fn count_medicines(conn: &Connection) -> Result<u32, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))?;
    Ok(count)
}

fn get_dose_slots(conn: &Connection, medicine_id: &str) -> Result<Vec<DoseSlot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, time FROM dose_slots WHERE medicine_id = ?1 ORDER BY position ASC",
    )?;
    let doses = stmt
        .query_map(params![medicine_id], |row| {
            Ok(DoseSlot {
                id: row.get(0)?,
                time: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(doses)
}

fn get_all_dose_slots(conn: &Connection) -> Result<HashMap<String, Vec<DoseSlot>>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT medicine_id, id, time FROM dose_slots ORDER BY medicine_id, position ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            DoseSlot {
                id: row.get(1)?,
                time: row.get(2)?,
            },
        ))
    })?;

    let mut grouped: HashMap<String, Vec<DoseSlot>> = HashMap::new();
    for row in rows {
        let (medicine_id, dose) = row?;
        grouped.entry(medicine_id).or_default().push(dose);
    }
    Ok(grouped)
}

// Internal row type for MedicineDefinition mapping
struct MedicineRow {
    id: String,
    name: String,
    dosage: String,
    days_of_week: String,
    start_date: String,
    end_date: Option<String>,
}

fn medicine_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<MedicineRow, rusqlite::Error> {
    Ok(MedicineRow {
        id: row.get(0)?,
        name: row.get(1)?,
        dosage: row.get(2)?,
        days_of_week: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
    })
}

fn medicine_from_row(row: MedicineRow, doses: Vec<DoseSlot>) -> MedicineDefinition {
    MedicineDefinition {
        id: row.id,
        name: row.name,
        dosage: row.dosage,
        doses,
        days: ActiveDays::from_storage(&row.days_of_week),
        start_date: row.start_date,
        end_date: row.end_date,
    }
}
