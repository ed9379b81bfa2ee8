// 📒 Class register: absences, delays and disciplinary notes

use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::FieldChecks;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,

    /// Set while a justification covers this absence
    pub justification_id: Option<String>,

    pub meta: VersionMeta,
}

impl Absence {
    pub fn is_justified(&self) -> bool {
        self.justification_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub entry_time: NaiveTime,
    pub meta: VersionMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub student_id: String,
    pub class_id: String,

    /// Username of the teacher who wrote the note
    pub teacher: String,

    pub date: NaiveDate,
    pub description: String,
    pub meta: VersionMeta,
}

macro_rules! versioned {
    ($ty:ty, $entity:literal) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $entity;

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
    };
}

versioned!(Absence, "Absence");
versioned!(Delay, "Delay");
versioned!(Note, "Note");

/// A late arrival entered from the daily register form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayEntry {
    pub student_id: String,
    pub entry_time: NaiveTime,
}

impl DelayEntry {
    pub fn new(student_id: &str, entry_time: NaiveTime) -> Self {
        DelayEntry {
            student_id: student_id.to_string(),
            entry_time,
        }
    }
}

/// Entries created by one [`ClassRegister::record_day`] call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DayRecord {
    pub absences: Vec<Absence>,
    pub delays: Vec<Delay>,
}

/// Everything the register holds for a class on a date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterDay {
    pub class_id: String,
    pub date: NaiveDate,
    pub absences: Vec<Absence>,
    pub delays: Vec<Delay>,
    pub notes: Vec<Note>,
}

fn check_description(description: &str) -> Result<(), ServiceError> {
    FieldChecks::new("Note")
        .length("description", description, 1, 500)
        .finish()
        .map_err(ServiceError::from)
}

// ============================================================================
// REGISTER
// ============================================================================

#[derive(Clone, Default)]
pub struct ClassRegister {
    absences: VersionedStore<Absence>,
    delays: VersionedStore<Delay>,
    notes: VersionedStore<Note>,
}

impl ClassRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the absences and late arrivals of one school day.
    ///
    /// Either every entry is stored or none is.
    pub fn record_day(
        &self,
        class_id: &str,
        date: NaiveDate,
        today: NaiveDate,
        absent_ids: &[String],
        delays: &[DelayEntry],
    ) -> ServiceResult<DayRecord> {
        let absent: HashSet<&str> = absent_ids.iter().map(|s| s.trim()).collect();
        let late: HashSet<&str> = delays.iter().map(|d| d.student_id.trim()).collect();

        let mut checks = FieldChecks::new("Register")
            .non_empty("class_id", class_id)
            .not_in_future("date", date, today)
            .custom(
                "absences",
                absent.len() == absent_ids.len(),
                "A student is listed as absent more than once",
            )
            .custom(
                "delays",
                late.len() == delays.len(),
                "A student is listed as late more than once",
            )
            .custom(
                "absences",
                absent_ids.iter().all(|s| !s.trim().is_empty()),
                "Absent student id is empty",
            );

        let mut both: Vec<&str> = absent.intersection(&late).copied().collect();
        both.sort_unstable();
        for student in both {
            checks = checks.custom(
                "delays",
                false,
                &format!("Student {} cannot be both absent and late", student),
            );
        }
        checks.finish()?;

        // Against what the register already holds for that day
        for student in &absent {
            if self.absence_on(student, date)?.is_some() {
                return Err(ServiceError::duplicate("Absence", format!("{} on {}", student, date)));
            }
            if self.delay_on(student, date)?.is_some() {
                return Err(ServiceError::InvalidState(format!(
                    "Student {} is already recorded as late on {}",
                    student, date
                )));
            }
        }
        for student in &late {
            if self.delay_on(student, date)?.is_some() {
                return Err(ServiceError::duplicate("Delay", format!("{} on {}", student, date)));
            }
            if self.absence_on(student, date)?.is_some() {
                return Err(ServiceError::InvalidState(format!(
                    "Student {} is already recorded as absent on {}",
                    student, date
                )));
            }
        }

        let mut record = DayRecord::default();
        for student_id in absent_ids {
            record.absences.push(self.absences.insert(Absence {
                id: uuid::Uuid::new_v4().to_string(),
                student_id: student_id.trim().to_string(),
                class_id: class_id.to_string(),
                date,
                justification_id: None,
                meta: VersionMeta::new(),
            })?);
        }
        for entry in delays {
            record.delays.push(self.delays.insert(Delay {
                id: uuid::Uuid::new_v4().to_string(),
                student_id: entry.student_id.trim().to_string(),
                class_id: class_id.to_string(),
                date,
                entry_time: entry.entry_time,
                meta: VersionMeta::new(),
            })?);
        }

        Ok(record)
    }

    fn absence_on(&self, student_id: &str, date: NaiveDate) -> ServiceResult<Option<Absence>> {
        Ok(self
            .absences
            .find(|a| a.student_id == student_id && a.date == date)?
            .into_iter()
            .next())
    }

    fn delay_on(&self, student_id: &str, date: NaiveDate) -> ServiceResult<Option<Delay>> {
        Ok(self
            .delays
            .find(|d| d.student_id == student_id && d.date == date)?
            .into_iter()
            .next())
    }

    // ---- absences ----------------------------------------------------------

    pub fn absence(&self, id: &str) -> ServiceResult<Absence> {
        self.absences.get(id)
    }

    /// Refused while a justification covers the absence
    pub fn delete_absence(&self, id: &str) -> ServiceResult<Absence> {
        let absence = self.absences.get(id)?;
        if absence.is_justified() {
            return Err(ServiceError::InvalidState(format!(
                "Absence of {} on {} is justified; delete the justification first",
                absence.student_id, absence.date
            )));
        }
        self.absences.retire(id)
    }

    pub fn mark_justified(&self, absence_id: &str, justification_id: &str) -> ServiceResult<Absence> {
        self.absences.update(absence_id, |absence| {
            if absence.is_justified() {
                return Err(ServiceError::InvalidState(format!(
                    "Absence of {} on {} is already justified",
                    absence.student_id, absence.date
                )));
            }
            absence.justification_id = Some(justification_id.to_string());
            Ok(())
        })
    }

    pub fn clear_justification(&self, absence_id: &str) -> ServiceResult<Absence> {
        self.absences.update(absence_id, |absence| {
            absence.justification_id = None;
            Ok(())
        })
    }

    /// Oldest first
    pub fn absences_for_student(&self, student_id: &str) -> ServiceResult<Vec<Absence>> {
        let mut absences = self.absences.find(|a| a.student_id == student_id)?;
        absences.sort_by_key(|a| a.date);
        Ok(absences)
    }

    // ---- delays ------------------------------------------------------------

    pub fn edit_delay(&self, id: &str, entry_time: NaiveTime) -> ServiceResult<Delay> {
        self.delays.update(id, |delay| {
            delay.entry_time = entry_time;
            Ok(())
        })
    }

    pub fn delete_delay(&self, id: &str) -> ServiceResult<Delay> {
        self.delays.retire(id)
    }

    pub fn delay(&self, id: &str) -> ServiceResult<Delay> {
        self.delays.get(id)
    }

    pub fn delays_for_student(&self, student_id: &str) -> ServiceResult<Vec<Delay>> {
        let mut delays = self.delays.find(|d| d.student_id == student_id)?;
        delays.sort_by_key(|d| (d.date, d.entry_time));
        Ok(delays)
    }

    // ---- notes -------------------------------------------------------------

    pub fn insert_note(
        &self,
        student_id: &str,
        class_id: &str,
        teacher: &str,
        date: NaiveDate,
        today: NaiveDate,
        description: &str,
    ) -> ServiceResult<Note> {
        FieldChecks::new("Note")
            .non_empty("student_id", student_id)
            .not_in_future("date", date, today)
            .length("description", description, 1, 500)
            .finish()?;

        self.notes.insert(Note {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            teacher: teacher.to_string(),
            date,
            description: description.trim().to_string(),
            meta: VersionMeta::new(),
        })
    }

    pub fn edit_note(&self, id: &str, description: &str) -> ServiceResult<Note> {
        check_description(description)?;
        self.notes.update(id, |note| {
            note.description = description.trim().to_string();
            Ok(())
        })
    }

    pub fn delete_note(&self, id: &str) -> ServiceResult<Note> {
        self.notes.retire(id)
    }

    pub fn note(&self, id: &str) -> ServiceResult<Note> {
        self.notes.get(id)
    }

    pub fn notes_for_student(&self, student_id: &str) -> ServiceResult<Vec<Note>> {
        let mut notes = self.notes.find(|n| n.student_id == student_id)?;
        notes.sort_by_key(|n| n.date);
        Ok(notes)
    }

    // ---- views -------------------------------------------------------------

    pub fn entries_for_class_on(&self, class_id: &str, date: NaiveDate) -> ServiceResult<RegisterDay> {
        Ok(RegisterDay {
            class_id: class_id.to_string(),
            date,
            absences: self
                .absences
                .find(|a| a.class_id == class_id && a.date == date)?,
            delays: self
                .delays
                .find(|d| d.class_id == class_id && d.date == date)?,
            notes: self.notes.find(|n| n.class_id == class_id && n.date == date)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn today() -> NaiveDate {
        date(2024, 3, 15)
    }

    #[test]
    fn test_record_day() {
        let register = ClassRegister::new();
        let record = register
            .record_day(
                "3A",
                date(2024, 3, 14),
                today(),
                &ids(&["S001", "S002"]),
                &[DelayEntry::new("S003", at(8, 20))],
            )
            .unwrap();

        assert_eq!(record.absences.len(), 2);
        assert_eq!(record.delays.len(), 1);
        assert_eq!(record.delays[0].entry_time, at(8, 20));

        let day = register.entries_for_class_on("3A", date(2024, 3, 14)).unwrap();
        assert_eq!(day.absences.len(), 2);
        assert_eq!(day.delays.len(), 1);
        assert!(register
            .entries_for_class_on("3A", date(2024, 3, 13))
            .unwrap()
            .absences
            .is_empty());
    }

    #[test]
    fn test_future_date_rejected() {
        let register = ClassRegister::new();
        let err = register
            .record_day("3A", date(2024, 3, 16), today(), &ids(&["S001"]), &[])
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(register.absences_for_student("S001").unwrap().is_empty());
    }

    #[test]
    fn test_absent_and_late_rejected() {
        let register = ClassRegister::new();
        let err = register
            .record_day(
                "3A",
                today(),
                today(),
                &ids(&["S001", "S002"]),
                &[DelayEntry::new("S002", at(9, 0))],
            )
            .unwrap_err();

        match err {
            ServiceError::Validation(errors) => {
                assert_eq!(errors[0].message, "Student S002 cannot be both absent and late");
            }
            other => panic!("unexpected error: {}", other),
        }
        // All-or-nothing
        assert!(register.absences_for_student("S001").unwrap().is_empty());
    }

    #[test]
    fn test_second_entry_same_day_is_duplicate() {
        let register = ClassRegister::new();
        register
            .record_day("3A", today(), today(), &ids(&["S001"]), &[])
            .unwrap();

        let err = register
            .record_day("3A", today(), today(), &ids(&["S002", "S001"]), &[])
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate");
        // S002 was not stored either
        assert!(register.absences_for_student("S002").unwrap().is_empty());

        let err = register
            .record_day("3A", today(), today(), &[], &[DelayEntry::new("S001", at(8, 10))])
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
    }

    #[test]
    fn test_justified_absence_cannot_be_deleted() {
        let register = ClassRegister::new();
        let record = register
            .record_day("3A", today(), today(), &ids(&["S001"]), &[])
            .unwrap();
        let absence_id = record.absences[0].id.clone();

        register.mark_justified(&absence_id, "j1").unwrap();
        assert_eq!(register.delete_absence(&absence_id).unwrap_err().kind(), "invalid_state");
        assert_eq!(register.mark_justified(&absence_id, "j2").unwrap_err().kind(), "invalid_state");

        register.clear_justification(&absence_id).unwrap();
        register.delete_absence(&absence_id).unwrap();
        assert_eq!(register.absence(&absence_id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_edit_and_delete_delay() {
        let register = ClassRegister::new();
        let record = register
            .record_day("3A", today(), today(), &[], &[DelayEntry::new("S001", at(8, 15))])
            .unwrap();
        let delay_id = record.delays[0].id.clone();

        let edited = register.edit_delay(&delay_id, at(8, 40)).unwrap();
        assert_eq!(edited.entry_time, at(8, 40));
        assert_eq!(edited.meta.version, 2);

        register.delete_delay(&delay_id).unwrap();
        assert!(register.delays_for_student("S001").unwrap().is_empty());
    }

    #[test]
    fn test_notes() {
        let register = ClassRegister::new();
        let note = register
            .insert_note("S001", "3A", "prof.verdi", today(), today(), "Disturbed the lesson")
            .unwrap();

        let too_long = "x".repeat(501);
        assert_eq!(register.edit_note(&note.id, &too_long).unwrap_err().kind(), "validation");
        assert_eq!(register.edit_note(&note.id, "   ").unwrap_err().kind(), "validation");

        let edited = register.edit_note(&note.id, "Used the phone during the test").unwrap();
        assert_eq!(edited.description, "Used the phone during the test");

        register.delete_note(&note.id).unwrap();
        assert!(register.notes_for_student("S001").unwrap().is_empty());

        let err = register
            .insert_note("S001", "3A", "prof.verdi", date(2024, 4, 1), today(), "Late homework")
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
