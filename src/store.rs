use crate::fees::{FeeType, Payment, StudentFeeAssignment};
use crate::ledger::{LedgerStudent, StudentRecord};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolRow {
    pub id: String,
    pub name: String,
    pub class_count: i64,
    pub student_count: i64,
}

pub fn list_schools(conn: &Connection) -> anyhow::Result<Vec<SchoolRow>> {
    let mut stmt = conn.prepare(
        "SELECT
           sc.id,
           sc.name,
           (SELECT COUNT(*) FROM classes c WHERE c.school_id = sc.id),
           (SELECT COUNT(*) FROM students s WHERE s.school_id = sc.id)
         FROM schools sc
         ORDER BY sc.name COLLATE NOCASE, sc.id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(SchoolRow {
                id: r.get(0)?,
                name: r.get(1)?,
                class_count: r.get(2)?,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn school_name_taken(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM schools WHERE lower(name) = lower(?)",
            [name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn insert_school(conn: &Connection, name: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO schools(id, name) VALUES(?, ?)", (&id, name))
        .context("failed to insert school")?;
    Ok(id)
}

pub fn school_exists(conn: &Connection, school_id: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row("SELECT 1 FROM schools WHERE id = ?", [school_id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(hit.is_some())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub student_count: i64,
    pub fee_type_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeTypeRecord {
    #[serde(flatten)]
    pub fee: FeeType,
    pub description: Option<String>,
    pub classes: Vec<ClassRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeTypeDraft {
    pub name: String,
    pub description: Option<String>,
    pub default_amount: f64,
    pub applicable_from: Option<String>,
    pub applicable_until: Option<String>,
    pub scheduled_date: Option<String>,
    pub class_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentDraft {
    pub name: String,
    pub class_id: Option<String>,
    pub roll_no: Option<String>,
    pub academic_year: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentDraft {
    pub assigned_amount: Option<f64>,
    pub discount: f64,
    pub discount_description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    #[serde(flatten)]
    pub payment: Payment,
    pub recorded_at: Option<String>,
}

fn fee_type_from_row(r: &Row<'_>, offset: usize) -> rusqlite::Result<Option<FeeType>> {
    let id: Option<String> = r.get(offset)?;
    let Some(id) = id else {
        return Ok(None);
    };
    Ok(Some(FeeType {
        id,
        name: r.get(offset + 1)?,
        default_amount: r.get(offset + 2)?,
        applicable_from: r.get(offset + 3)?,
        applicable_until: r.get(offset + 4)?,
        scheduled_date: r.get(offset + 5)?,
    }))
}

/// Data access restricted to one school. Every statement issued through a
/// scope filters on its `school_id`, so a handler holding a scope cannot reach
/// another tenant's rows.
pub struct SchoolScope<'a> {
    conn: &'a Connection,
    school_id: String,
}

impl<'a> SchoolScope<'a> {
    pub fn new(conn: &'a Connection, school_id: impl Into<String>) -> Self {
        Self {
            conn,
            school_id: school_id.into(),
        }
    }

    pub fn school_id(&self) -> &str {
        &self.school_id
    }

    // Classes

    pub fn list_classes(&self) -> anyhow::Result<Vec<ClassRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT
               c.id,
               c.name,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id AND s.school_id = c.school_id),
               (SELECT COUNT(*) FROM fee_type_classes l WHERE l.class_id = c.id AND l.school_id = c.school_id)
             FROM classes c
             WHERE c.school_id = ?
             ORDER BY c.name COLLATE NOCASE, c.id",
        )?;
        let rows = stmt
            .query_map([&self.school_id], |r| {
                Ok(ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    student_count: r.get(2)?,
                    fee_type_count: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn class_name(&self, class_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT name FROM classes WHERE id = ? AND school_id = ?",
                (class_id, &self.school_id),
                |r| r.get(0),
            )
            .optional()?)
    }

    pub fn class_name_taken(&self, name: &str) -> anyhow::Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM classes WHERE school_id = ? AND lower(name) = lower(?)",
                (&self.school_id, name),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    pub fn insert_class(&self, name: &str) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO classes(id, school_id, name) VALUES(?, ?, ?)",
                (&id, &self.school_id, name),
            )
            .context("failed to insert class")?;
        Ok(id)
    }

    pub fn class_student_count(&self, class_id: &str) -> anyhow::Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM students WHERE class_id = ? AND school_id = ?",
            (class_id, &self.school_id),
            |r| r.get(0),
        )?)
    }

    /// Removes the class and its fee-type links. Callers check enrollment first.
    pub fn delete_class(&self, class_id: &str) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM fee_type_classes WHERE class_id = ? AND school_id = ?",
            (class_id, &self.school_id),
        )
        .context("failed to remove class links")?;
        tx.execute(
            "DELETE FROM classes WHERE id = ? AND school_id = ?",
            (class_id, &self.school_id),
        )
        .context("failed to delete class")?;
        tx.commit()?;
        Ok(())
    }

    // Fee types

    fn fee_type_classes(&self, fee_type_id: &str) -> anyhow::Result<Vec<ClassRef>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name
             FROM fee_type_classes l
             JOIN classes c ON c.id = l.class_id
             WHERE l.fee_type_id = ? AND l.school_id = ? AND c.school_id = ?
             ORDER BY c.name COLLATE NOCASE, c.id",
        )?;
        let rows = stmt
            .query_map((fee_type_id, &self.school_id, &self.school_id), |r| {
                Ok(ClassRef {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_fee_types(&self) -> anyhow::Result<Vec<FeeTypeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, default_amount, applicable_from, applicable_until, scheduled_date, description
             FROM fee_types
             WHERE school_id = ?
             ORDER BY name COLLATE NOCASE, id",
        )?;
        let fees = stmt
            .query_map([&self.school_id], |r| {
                let fee = fee_type_from_row(r, 0)?;
                let description: Option<String> = r.get(6)?;
                Ok((fee, description))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(fees.len());
        for (fee, description) in fees {
            let Some(fee) = fee else {
                continue;
            };
            let classes = self.fee_type_classes(&fee.id)?;
            out.push(FeeTypeRecord {
                fee,
                description,
                classes,
            });
        }
        Ok(out)
    }

    pub fn get_fee_type(&self, fee_type_id: &str) -> anyhow::Result<Option<FeeTypeRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, default_amount, applicable_from, applicable_until, scheduled_date, description
                 FROM fee_types
                 WHERE id = ? AND school_id = ?",
                (fee_type_id, &self.school_id),
                |r| {
                    let fee = fee_type_from_row(r, 0)?;
                    let description: Option<String> = r.get(6)?;
                    Ok((fee, description))
                },
            )
            .optional()?;
        let Some((Some(fee), description)) = row else {
            return Ok(None);
        };
        let classes = self.fee_type_classes(&fee.id)?;
        Ok(Some(FeeTypeRecord {
            fee,
            description,
            classes,
        }))
    }

    fn link_classes(
        &self,
        tx: &rusqlite::Transaction<'_>,
        fee_type_id: &str,
        class_ids: &[String],
    ) -> anyhow::Result<usize> {
        let mut linked = 0;
        for class_id in class_ids {
            // Classes outside this school are silently skipped.
            linked += tx
                .execute(
                    "INSERT OR IGNORE INTO fee_type_classes(fee_type_id, class_id, school_id)
                     SELECT ?, id, school_id FROM classes WHERE id = ? AND school_id = ?",
                    (fee_type_id, class_id, &self.school_id),
                )
                .context("failed to link class")?;
        }
        Ok(linked)
    }

    pub fn insert_fee_type(&self, draft: &FeeTypeDraft) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO fee_types(id, school_id, name, description, default_amount, applicable_from, applicable_until, scheduled_date)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &self.school_id,
                &draft.name,
                &draft.description,
                draft.default_amount,
                &draft.applicable_from,
                &draft.applicable_until,
                &draft.scheduled_date,
            ),
        )
        .context("failed to insert fee type")?;
        self.link_classes(&tx, &id, &draft.class_ids)?;
        tx.commit()?;
        Ok(id)
    }

    /// Rewrites the fee type and replaces its class links.
    pub fn update_fee_type(&self, fee_type_id: &str, draft: &FeeTypeDraft) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE fee_types
             SET name = ?, description = ?, default_amount = ?, applicable_from = ?, applicable_until = ?, scheduled_date = ?
             WHERE id = ? AND school_id = ?",
            (
                &draft.name,
                &draft.description,
                draft.default_amount,
                &draft.applicable_from,
                &draft.applicable_until,
                &draft.scheduled_date,
                fee_type_id,
                &self.school_id,
            ),
        )
        .context("failed to update fee type")?;
        tx.execute(
            "DELETE FROM fee_type_classes WHERE fee_type_id = ? AND school_id = ?",
            (fee_type_id, &self.school_id),
        )
        .context("failed to clear class links")?;
        self.link_classes(&tx, fee_type_id, &draft.class_ids)?;
        tx.commit()?;
        Ok(())
    }

    /// Deletes the fee type along with every student assignment and class link
    /// that references it.
    pub fn delete_fee_type(&self, fee_type_id: &str) -> anyhow::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let detached = tx
            .execute(
                "DELETE FROM student_fee_types WHERE fee_type_id = ? AND school_id = ?",
                (fee_type_id, &self.school_id),
            )
            .context("failed to dissociate fee type from students")?;
        tx.execute(
            "DELETE FROM fee_type_classes WHERE fee_type_id = ? AND school_id = ?",
            (fee_type_id, &self.school_id),
        )
        .context("failed to remove class links")?;
        tx.execute(
            "DELETE FROM fee_types WHERE id = ? AND school_id = ?",
            (fee_type_id, &self.school_id),
        )
        .context("failed to delete fee type")?;
        tx.commit()?;
        Ok(detached)
    }

    // Students

    fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
        Ok(StudentRecord {
            id: r.get(0)?,
            name: r.get(1)?,
            class_id: r.get(2)?,
            class_name: r.get(3)?,
            roll_no: r.get(4)?,
            academic_year: r.get(5)?,
        })
    }

    pub fn list_students(&self, class_id: Option<&str>) -> anyhow::Result<Vec<StudentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.name, s.class_id, c.name, s.roll_no, s.academic_year
             FROM students s
             LEFT JOIN classes c ON c.id = s.class_id AND c.school_id = s.school_id
             WHERE s.school_id = ?1 AND (?2 IS NULL OR s.class_id = ?2)
             ORDER BY s.name COLLATE NOCASE, s.id",
        )?;
        let rows = stmt
            .query_map((&self.school_id, class_id), Self::student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_student(&self, student_id: &str) -> anyhow::Result<Option<StudentRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT s.id, s.name, s.class_id, c.name, s.roll_no, s.academic_year
                 FROM students s
                 LEFT JOIN classes c ON c.id = s.class_id AND c.school_id = s.school_id
                 WHERE s.id = ? AND s.school_id = ?",
                (student_id, &self.school_id),
                Self::student_from_row,
            )
            .optional()?)
    }

    pub fn insert_student(&self, draft: &StudentDraft) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO students(id, school_id, class_id, name, roll_no, academic_year)
                 VALUES(?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &self.school_id,
                    &draft.class_id,
                    &draft.name,
                    &draft.roll_no,
                    &draft.academic_year,
                ),
            )
            .context("failed to insert student")?;
        Ok(id)
    }

    pub fn update_student(&self, student_id: &str, draft: &StudentDraft) -> anyhow::Result<()> {
        self.conn
            .execute(
                "UPDATE students SET class_id = ?, name = ?, roll_no = ?, academic_year = ?
                 WHERE id = ? AND school_id = ?",
                (
                    &draft.class_id,
                    &draft.name,
                    &draft.roll_no,
                    &draft.academic_year,
                    student_id,
                    &self.school_id,
                ),
            )
            .context("failed to update student")?;
        Ok(())
    }

    pub fn delete_student(&self, student_id: &str) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM student_fee_types WHERE student_id = ? AND school_id = ?",
            (student_id, &self.school_id),
        )
        .context("failed to delete student fee types")?;
        tx.execute(
            "DELETE FROM payments WHERE student_id = ? AND school_id = ?",
            (student_id, &self.school_id),
        )
        .context("failed to delete student payments")?;
        tx.execute(
            "DELETE FROM students WHERE id = ? AND school_id = ?",
            (student_id, &self.school_id),
        )
        .context("failed to delete student")?;
        tx.commit()?;
        Ok(())
    }

    // Fee assignments

    pub fn upsert_assignment(
        &self,
        student_id: &str,
        fee_type_id: &str,
        draft: &AssignmentDraft,
    ) -> anyhow::Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM student_fee_types
                 WHERE student_id = ? AND fee_type_id = ? AND school_id = ?",
                (student_id, fee_type_id, &self.school_id),
                |r| r.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            self.conn
                .execute(
                    "UPDATE student_fee_types
                     SET assigned_amount = ?, discount = ?, discount_description = ?
                     WHERE id = ? AND school_id = ?",
                    (
                        draft.assigned_amount,
                        draft.discount,
                        &draft.discount_description,
                        &id,
                        &self.school_id,
                    ),
                )
                .context("failed to update fee assignment")?;
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO student_fee_types(id, school_id, student_id, fee_type_id, assigned_amount, discount, discount_description)
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &self.school_id,
                    student_id,
                    fee_type_id,
                    draft.assigned_amount,
                    draft.discount,
                    &draft.discount_description,
                ),
            )
            .context("failed to insert fee assignment")?;
        Ok(id)
    }

    /// Assigns the fee type to every student of the class that lacks it.
    /// Returns the number of new assignments.
    pub fn assign_to_class(&self, class_id: &str, fee_type_id: &str) -> anyhow::Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let student_ids = {
            let mut stmt = tx.prepare(
                "SELECT s.id FROM students s
                 WHERE s.class_id = ?1 AND s.school_id = ?2
                   AND NOT EXISTS (
                     SELECT 1 FROM student_fee_types sft
                     WHERE sft.student_id = s.id AND sft.fee_type_id = ?3
                   )
                 ORDER BY s.name COLLATE NOCASE, s.id",
            )?;
            let ids = stmt
                .query_map((class_id, &self.school_id, fee_type_id), |r| {
                    r.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        for sid in &student_ids {
            tx.execute(
                "INSERT INTO student_fee_types(id, school_id, student_id, fee_type_id, assigned_amount, discount, discount_description)
                 VALUES(?, ?, ?, ?, NULL, 0, NULL)",
                (
                    Uuid::new_v4().to_string(),
                    &self.school_id,
                    sid,
                    fee_type_id,
                ),
            )
            .context("failed to insert fee assignment")?;
        }
        tx.commit()?;
        Ok(student_ids.len())
    }

    pub fn remove_assignment(&self, student_id: &str, fee_type_id: &str) -> anyhow::Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM student_fee_types
                 WHERE student_id = ? AND fee_type_id = ? AND school_id = ?",
                (student_id, fee_type_id, &self.school_id),
            )
            .context("failed to remove fee assignment")?;
        Ok(n > 0)
    }

    /// Assignments keyed by student. The fee type is joined within the same
    /// school and comes back `None` when it no longer resolves.
    fn assignments_by_student(
        &self,
        student_id: Option<&str>,
    ) -> anyhow::Result<HashMap<String, Vec<StudentFeeAssignment>>> {
        let mut stmt = self.conn.prepare(
            "SELECT sft.student_id, sft.id, sft.assigned_amount, sft.discount, sft.discount_description,
                    ft.id, ft.name, ft.default_amount, ft.applicable_from, ft.applicable_until, ft.scheduled_date
             FROM student_fee_types sft
             LEFT JOIN fee_types ft ON ft.id = sft.fee_type_id AND ft.school_id = sft.school_id
             WHERE sft.school_id = ?1 AND (?2 IS NULL OR sft.student_id = ?2)
             ORDER BY sft.student_id, ft.name COLLATE NOCASE, sft.id",
        )?;
        let rows = stmt
            .query_map((&self.school_id, student_id), |r| {
                let sid: String = r.get(0)?;
                Ok((
                    sid,
                    StudentFeeAssignment {
                        id: r.get(1)?,
                        assigned_amount: r.get(2)?,
                        discount: r.get(3)?,
                        discount_description: r.get(4)?,
                        fee_type: fee_type_from_row(r, 5)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out: HashMap<String, Vec<StudentFeeAssignment>> = HashMap::new();
        for (sid, a) in rows {
            out.entry(sid).or_default().push(a);
        }
        Ok(out)
    }

    pub fn student_assignments(&self, student_id: &str) -> anyhow::Result<Vec<StudentFeeAssignment>> {
        Ok(self
            .assignments_by_student(Some(student_id))?
            .remove(student_id)
            .unwrap_or_default())
    }

    // Payments

    pub fn receipt_taken(&self, receipt_number: &str) -> anyhow::Result<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM payments WHERE school_id = ? AND receipt_number = ?",
                (&self.school_id, receipt_number),
                |r| r.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Appends a payment. Payments are never updated or deleted individually.
    pub fn insert_payment(
        &self,
        student_id: &str,
        payment: &Payment,
        recorded_at: &str,
    ) -> anyhow::Result<String> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO payments(id, school_id, student_id, date, amount_paid, mode_of_payment, receipt_number, recorded_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    &self.school_id,
                    student_id,
                    &payment.date,
                    payment.amount_paid,
                    &payment.mode_of_payment,
                    &payment.receipt_number,
                    recorded_at,
                ),
            )
            .context("failed to insert payment")?;
        Ok(id)
    }

    fn payments_by_student(
        &self,
        student_id: Option<&str>,
    ) -> anyhow::Result<HashMap<String, Vec<PaymentRecord>>> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, id, date, amount_paid, mode_of_payment, receipt_number, recorded_at
             FROM payments
             WHERE school_id = ?1 AND (?2 IS NULL OR student_id = ?2)
             ORDER BY student_id, rowid",
        )?;
        let rows = stmt
            .query_map((&self.school_id, student_id), |r| {
                let sid: String = r.get(0)?;
                Ok((
                    sid,
                    PaymentRecord {
                        id: r.get(1)?,
                        payment: Payment {
                            date: r.get(2)?,
                            amount_paid: r.get(3)?,
                            mode_of_payment: r.get(4)?,
                            receipt_number: r.get(5)?,
                        },
                        recorded_at: r.get(6)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out: HashMap<String, Vec<PaymentRecord>> = HashMap::new();
        for (sid, p) in rows {
            out.entry(sid).or_default().push(p);
        }
        Ok(out)
    }

    /// Payments in recording order.
    pub fn student_payments(&self, student_id: &str) -> anyhow::Result<Vec<PaymentRecord>> {
        Ok(self
            .payments_by_student(Some(student_id))?
            .remove(student_id)
            .unwrap_or_default())
    }

    /// Loads students (optionally one class) with their assignments and
    /// payments in three queries.
    pub fn load_ledger_students(&self, class_id: Option<&str>) -> anyhow::Result<Vec<LedgerStudent>> {
        let students = self.list_students(class_id)?;
        let mut assignments = self.assignments_by_student(None)?;
        let mut payments = self.payments_by_student(None)?;
        Ok(students
            .into_iter()
            .map(|student| {
                let a = assignments.remove(&student.id).unwrap_or_default();
                let p = payments
                    .remove(&student.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|rec| rec.payment)
                    .collect();
                LedgerStudent {
                    student,
                    assignments: a,
                    payments: p,
                }
            })
            .collect())
    }
}
