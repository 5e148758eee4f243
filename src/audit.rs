//! Append-only trail of result changes applied by the recheck workflow.

use crate::error::Result;
use crate::models::AuditEntry;
use rusqlite::{Connection, Row};

/// Writes one entry. Callers pass the transaction that applies the change so
/// the trail and the result row commit together.
pub fn append(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO result_change_audit(
            id, result_id, request_id, changed_by_role,
            old_marks, new_marks, old_grade, new_grade,
            old_grade_point, new_grade_point, old_status, new_status,
            comment, changed_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &entry.id,
            &entry.result_id,
            &entry.request_id,
            &entry.changed_by_role,
            entry.old_marks,
            entry.new_marks,
            entry.old_grade,
            entry.new_grade,
            entry.old_grade_point,
            entry.new_grade_point,
            entry.old_status,
            entry.new_status,
            &entry.comment,
            &entry.timestamp,
        ),
    )?;
    Ok(())
}

fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: r.get(0)?,
        result_id: r.get(1)?,
        request_id: r.get(2)?,
        changed_by_role: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
        old_marks: r.get(4)?,
        new_marks: r.get(5)?,
        old_grade: r.get(6)?,
        new_grade: r.get(7)?,
        old_grade_point: r.get(8)?,
        new_grade_point: r.get(9)?,
        old_status: r.get(10)?,
        new_status: r.get(11)?,
        comment: r.get(12)?,
        timestamp: r.get(13)?,
    })
}

fn entries_where(conn: &Connection, column: &str, value: &str) -> Result<Vec<AuditEntry>> {
    let sql = format!(
        "SELECT id, result_id, request_id, changed_by_role,
                old_marks, new_marks, old_grade, new_grade,
                old_grade_point, new_grade_point, old_status, new_status,
                comment, changed_at
         FROM result_change_audit
         WHERE {} = ?
         ORDER BY changed_at, rowid",
        column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn entries_for_result(conn: &Connection, result_id: &str) -> Result<Vec<AuditEntry>> {
    entries_where(conn, "result_id", result_id)
}

pub fn entries_for_request(conn: &Connection, request_id: &str) -> Result<Vec<AuditEntry>> {
    entries_where(conn, "request_id", request_id)
}
