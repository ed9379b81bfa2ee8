// 🧾 Absence justifications
//
// A justification covers exactly one absence. The book stores justifications;
// keeping the absence's `justification_id` in sync is done by the Smos
// service, which owns both the book and the register.

use super::register::Absence;
use crate::error::ServiceResult;
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub id: String,
    pub absence_id: String,
    pub student_id: String,

    /// Day the justification was presented
    pub date: NaiveDate,

    pub reason: String,
    pub recorded_by: String,
    pub meta: VersionMeta,
}

impl Versioned for Justification {
    const ENTITY: &'static str = "Justification";

    fn id(&self) -> &str {
        &self.id
    }
    fn meta(&self) -> &VersionMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut VersionMeta {
        &mut self.meta
    }
}

/// Reason 5-500 chars; presented between the absence and today
pub fn check_justification(
    reason: &str,
    date: NaiveDate,
    absence_date: NaiveDate,
    today: NaiveDate,
) -> ValidationResult {
    FieldChecks::new("Justification")
        .length("reason", reason, 5, 500)
        .not_in_future("date", date, today)
        .custom(
            "date",
            date >= absence_date,
            &format!("Date {} is before the absence on {}", date, absence_date),
        )
        .finish()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AbsenceSummary {
    pub justified: usize,
    pub unjustified: usize,
}

impl AbsenceSummary {
    pub fn from_absences(absences: &[Absence]) -> Self {
        let justified = absences.iter().filter(|a| a.is_justified()).count();
        AbsenceSummary {
            justified,
            unjustified: absences.len() - justified,
        }
    }

    pub fn total(&self) -> usize {
        self.justified + self.unjustified
    }
}

#[derive(Clone, Default)]
pub struct JustificationBook {
    justifications: VersionedStore<Justification>,
}

impl JustificationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        absence: &Absence,
        reason: &str,
        date: NaiveDate,
        today: NaiveDate,
        recorded_by: &str,
    ) -> ServiceResult<Justification> {
        check_justification(reason, date, absence.date, today)?;

        self.justifications.insert(Justification {
            id: uuid::Uuid::new_v4().to_string(),
            absence_id: absence.id.clone(),
            student_id: absence.student_id.clone(),
            date,
            reason: reason.trim().to_string(),
            recorded_by: recorded_by.to_string(),
            meta: VersionMeta::new(),
        })
    }

    pub fn edit(
        &self,
        id: &str,
        absence: &Absence,
        reason: &str,
        date: NaiveDate,
        today: NaiveDate,
    ) -> ServiceResult<Justification> {
        check_justification(reason, date, absence.date, today)?;
        self.justifications.update(id, |justification| {
            justification.reason = reason.trim().to_string();
            justification.date = date;
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> ServiceResult<Justification> {
        self.justifications.retire(id)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Justification> {
        self.justifications.get(id)
    }

    /// Oldest first
    pub fn for_student(&self, student_id: &str) -> ServiceResult<Vec<Justification>> {
        let mut list = self.justifications.find(|j| j.student_id == student_id)?;
        list.sort_by_key(|j| j.date);
        Ok(list)
    }
}
