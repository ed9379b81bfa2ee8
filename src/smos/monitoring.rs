// 🔎 Student monitoring: who is piling up absences and notes

use super::register::ClassRegister;
use super::school::{AcademicYear, SchoolRegistry};
use crate::error::ServiceResult;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentLoad {
    pub student_id: String,
    pub full_name: String,
    pub absences: usize,
    pub notes: usize,
}

/// Students whose absences and notes inside `year` both exceed the thresholds.
///
/// Sorted by absences, then notes (both descending), then name.
pub fn monitor(
    register: &ClassRegister,
    school: &SchoolRegistry,
    year: &AcademicYear,
    absence_threshold: usize,
    note_threshold: usize,
) -> ServiceResult<Vec<StudentLoad>> {
    let mut flagged = Vec::new();

    for student in school.all_students()? {
        if student.id.trim().is_empty() {
            continue;
        }

        let absences = register
            .absences_for_student(&student.id)?
            .iter()
            .filter(|a| year.contains(a.date))
            .count();
        let notes = register
            .notes_for_student(&student.id)?
            .iter()
            .filter(|n| year.contains(n.date))
            .count();

        if absences > absence_threshold && notes > note_threshold {
            flagged.push(StudentLoad {
                full_name: student.full_name(),
                student_id: student.id,
                absences,
                notes,
            });
        }
    }

    flagged.sort_by(|a, b| {
        b.absences
            .cmp(&a.absences)
            .then_with(|| b.notes.cmp(&a.notes))
            .then_with(|| a.full_name.cmp(&b.full_name))
    });

    Ok(flagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smos::school::StudentDraft;
    use chrono::{Duration, NaiveDate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Give a student `absences` absences and `notes` notes starting on `from`
    fn load(register: &ClassRegister, student: &str, from: NaiveDate, absences: i64, notes: i64) {
        let today = date(2030, 1, 1);
        for day in 0..absences {
            register
                .record_day("3A", from + Duration::days(day), today, &[student.to_string()], &[])
                .unwrap();
        }
        for day in 0..notes {
            register
                .insert_note(student, "3A", "prof", from + Duration::days(day), today, "Talking")
                .unwrap();
        }
    }

    fn setup() -> (ClassRegister, SchoolRegistry) {
        let school = SchoolRegistry::new();
        for (id, name, surname) in [
            ("S001", "John", "Smith"),
            ("S002", "Emma", "Johnson"),
            ("S003", "Liam", "Brown"),
            ("S004", "Ava", "Davis"),
        ] {
            school
                .add_student(
                    &StudentDraft::new(name, surname, "parent@example.com").with_id(id),
                    None,
                )
                .unwrap();
        }
        (ClassRegister::new(), school)
    }

    #[test]
    fn test_both_thresholds_must_be_exceeded() {
        let (register, school) = setup();
        let start = date(2023, 10, 2);

        load(&register, "S001", start, 6, 4); // flagged
        load(&register, "S002", start, 9, 2); // few notes
        load(&register, "S003", start, 5, 8); // absences equal to threshold
        load(&register, "S004", start, 8, 5); // flagged

        let year = AcademicYear::parse("2023-2024").unwrap();
        let flagged = monitor(&register, &school, &year, 5, 3).unwrap();

        let ids: Vec<&str> = flagged.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S004", "S001"]);
        assert_eq!(flagged[0].full_name, "Ava Davis");
        assert_eq!(flagged[0].absences, 8);
        assert_eq!(flagged[0].notes, 5);
    }

    #[test]
    fn test_only_entries_inside_the_year_count() {
        let (register, school) = setup();

        // Previous school year
        load(&register, "S001", date(2023, 5, 2), 10, 10);
        let year = AcademicYear::parse("2023-2024").unwrap();
        assert!(monitor(&register, &school, &year, 5, 3).unwrap().is_empty());

        let previous = AcademicYear::parse("2022-2023").unwrap();
        assert_eq!(monitor(&register, &school, &previous, 5, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_ties_sorted_by_notes_then_name() {
        let (register, school) = setup();
        let start = date(2023, 11, 6);

        load(&register, "S001", start, 7, 4);
        load(&register, "S002", start, 7, 6);
        load(&register, "S003", start, 7, 4);

        let year = AcademicYear::parse("2023-2024").unwrap();
        let names: Vec<String> = monitor(&register, &school, &year, 5, 3)
            .unwrap()
            .into_iter()
            .map(|s| s.full_name)
            .collect();
        assert_eq!(names, vec!["Emma Johnson", "John Smith", "Liam Brown"]);
    }
}
