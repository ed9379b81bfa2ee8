// 🏫 Classes, students, teachings and enrollment

use crate::db::RosterRow;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationError, ValidationResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// ACADEMIC YEAR
// ============================================================================

/// "2023-2024": runs from 1 September of the first year to 31 August of the second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcademicYear {
    start: i32,
}

impl AcademicYear {
    pub fn new(start: i32) -> Self {
        AcademicYear { start }
    }

    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let invalid = |message: &str| ValidationError {
            field: "academic_year".to_string(),
            message: message.to_string(),
            context: "AcademicYear".to_string(),
        };

        let (first, second) = text
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("Expected the form YYYY-YYYY"))?;

        let first: i32 = first
            .parse()
            .map_err(|_| invalid("Expected the form YYYY-YYYY"))?;
        let second: i32 = second
            .parse()
            .map_err(|_| invalid("Expected the form YYYY-YYYY"))?;

        if !(1900..=2999).contains(&first) {
            return Err(invalid("Year out of range"));
        }
        if second != first + 1 {
            return Err(invalid("The second year must follow the first"));
        }

        Ok(AcademicYear { start: first })
    }

    /// Academic year a calendar date falls in
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 9 {
            AcademicYear::new(date.year())
        } else {
            AcademicYear::new(date.year() - 1)
        }
    }

    pub fn start_year(&self) -> i32 {
        self.start
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start, 9, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.start + 1, 8, 31)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        AcademicYear::containing(date) == *self
    }
}

impl std::fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.start + 1)
    }
}

impl TryFrom<String> for AcademicYear {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AcademicYear::parse(&value)
    }
}

impl From<AcademicYear> for String {
    fn from(year: AcademicYear) -> Self {
        year.to_string()
    }
}

// ============================================================================
// CLASS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: String,
    pub name: String,
    pub academic_year: AcademicYear,
    pub address: String,

    /// Subjects taught in this class
    pub teachings: BTreeSet<String>,

    pub meta: VersionMeta,
}

impl Versioned for SchoolClass {
    const ENTITY: &'static str = "Class";

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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDraft {
    pub name: String,
    pub academic_year: String,
    pub address: String,
}

impl ClassDraft {
    pub fn new(name: &str, academic_year: &str, address: &str) -> Self {
        ClassDraft {
            name: name.to_string(),
            academic_year: academic_year.to_string(),
            address: address.to_string(),
        }
    }

    pub fn validate(&self) -> Result<AcademicYear, Vec<ValidationError>> {
        let year = AcademicYear::parse(&self.academic_year);

        let mut errors = FieldChecks::new("Class")
            .length("name", &self.name, 1, 20)
            .non_empty("address", &self.address)
            .finish()
            .err()
            .unwrap_or_default();

        match year {
            Ok(year) if errors.is_empty() => Ok(year),
            Ok(_) => Err(errors),
            Err(err) => {
                errors.push(err);
                Err(errors)
            }
        }
    }
}

// ============================================================================
// STUDENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub surname: String,

    /// Where absence and note notifications go
    pub parent_email: String,

    pub class_id: Option<String>,
    pub meta: VersionMeta,
}

impl Versioned for Student {
    const ENTITY: &'static str = "Student";

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

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDraft {
    /// Registry number; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub surname: String,
    pub parent_email: String,
}

impl StudentDraft {
    pub fn new(name: &str, surname: &str, parent_email: &str) -> Self {
        StudentDraft {
            id: None,
            name: name.to_string(),
            surname: surname.to_string(),
            parent_email: parent_email.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn validate(&self) -> ValidationResult {
        FieldChecks::new("Student")
            .custom(
                "id",
                self.id.as_deref().map_or(true, |id| !id.trim().is_empty()),
                "Required field is empty",
            )
            .non_empty("name", &self.name)
            .non_empty("surname", &self.surname)
            .email("parent_email", &self.parent_email)
            .finish()
    }
}

// ============================================================================
// ENROLLMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub status: EnrollmentStatus,
    pub requested_at: DateTime<Utc>,
    pub meta: VersionMeta,
}

impl Versioned for EnrollmentRequest {
    const ENTITY: &'static str = "EnrollmentRequest";

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

/// Outcome of a roster import
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub classes_created: usize,
    pub students_added: usize,

    /// Rows whose student id already exists
    pub duplicates_skipped: usize,

    /// Rows that failed validation, with the reason
    pub invalid_rows: Vec<String>,
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Clone, Default)]
pub struct SchoolRegistry {
    classes: VersionedStore<SchoolClass>,
    students: VersionedStore<Student>,
    enrollments: VersionedStore<EnrollmentRequest>,
}

impl SchoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- classes -----------------------------------------------------------

    pub fn insert_class(&self, draft: &ClassDraft) -> ServiceResult<SchoolClass> {
        let year = draft.validate()?;
        let name = draft.name.trim();

        let wanted = name.to_lowercase();
        let clash = self
            .classes
            .find(|c| c.academic_year == year && c.name.to_lowercase() == wanted)?;
        if !clash.is_empty() {
            return Err(ServiceError::duplicate("Class", format!("{} ({})", name, year)));
        }

        self.classes.insert(SchoolClass {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            academic_year: year,
            address: draft.address.trim().to_string(),
            teachings: BTreeSet::new(),
            meta: VersionMeta::new(),
        })
    }

    pub fn edit_class_address(&self, class_id: &str, address: &str) -> ServiceResult<SchoolClass> {
        FieldChecks::new("Class").non_empty("address", address).finish()?;
        self.classes.update(class_id, |class| {
            class.address = address.trim().to_string();
            Ok(())
        })
    }

    /// Refused while any student is still enrolled in the class
    pub fn delete_class(&self, class_id: &str) -> ServiceResult<SchoolClass> {
        let class = self.classes.get(class_id)?;
        let enrolled = self.students_in_class(class_id)?.len();
        if enrolled > 0 {
            return Err(ServiceError::InvalidState(format!(
                "Class {} still has {} enrolled students",
                class.name, enrolled
            )));
        }
        self.classes.retire(class_id)
    }

    pub fn classes_for_year(&self, year: &AcademicYear) -> ServiceResult<Vec<SchoolClass>> {
        let mut classes = self.classes.find(|c| c.academic_year == *year)?;
        classes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(classes)
    }

    pub fn get_class(&self, class_id: &str) -> ServiceResult<SchoolClass> {
        self.classes.get(class_id)
    }

    pub fn find_class(&self, name: &str, year: &AcademicYear) -> ServiceResult<Option<SchoolClass>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .classes
            .find(|c| c.academic_year == *year && c.name.to_lowercase() == wanted)?
            .into_iter()
            .next())
    }

    // ---- teachings ---------------------------------------------------------

    fn check_subjects(subjects: &[String]) -> ValidationResult {
        let mut checks = FieldChecks::new("Teaching").custom(
            "subjects",
            !subjects.is_empty(),
            "At least one subject is required",
        );
        for subject in subjects {
            checks = checks.length("subjects", subject, 1, 50);
        }
        checks.finish()
    }

    /// Add subjects to a class, returning the ones not already taught there
    pub fn assign_teachings(&self, class_id: &str, subjects: &[String]) -> ServiceResult<Vec<String>> {
        Self::check_subjects(subjects)?;

        let class = self.classes.get(class_id)?;
        let added: Vec<String> = subjects
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !class.teachings.contains(s))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !added.is_empty() {
            self.classes.update(class_id, |class| {
                class.teachings.extend(added.iter().cloned());
                Ok(())
            })?;
        }
        Ok(added)
    }

    /// Remove subjects from a class, returning the ones that were taught there
    pub fn remove_teachings(&self, class_id: &str, subjects: &[String]) -> ServiceResult<Vec<String>> {
        Self::check_subjects(subjects)?;

        let class = self.classes.get(class_id)?;
        let removed: Vec<String> = subjects
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| class.teachings.contains(s))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !removed.is_empty() {
            self.classes.update(class_id, |class| {
                for subject in &removed {
                    class.teachings.remove(subject);
                }
                Ok(())
            })?;
        }
        Ok(removed)
    }

    // ---- students ----------------------------------------------------------

    pub fn add_student(&self, draft: &StudentDraft, class_id: Option<&str>) -> ServiceResult<Student> {
        draft.validate()?;
        if let Some(class_id) = class_id {
            self.classes.get(class_id)?;
        }

        let id = match &draft.id {
            Some(id) => id.trim().to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };

        self.students.insert(Student {
            id,
            name: draft.name.trim().to_string(),
            surname: draft.surname.trim().to_string(),
            parent_email: draft.parent_email.trim().to_string(),
            class_id: class_id.map(str::to_string),
            meta: VersionMeta::new(),
        })
    }

    /// Sorted by surname, then name
    pub fn students_in_class(&self, class_id: &str) -> ServiceResult<Vec<Student>> {
        let mut students = self
            .students
            .find(|s| s.class_id.as_deref() == Some(class_id))?;
        students.sort_by(|a, b| a.surname.cmp(&b.surname).then_with(|| a.name.cmp(&b.name)));
        Ok(students)
    }

    pub fn get_student(&self, student_id: &str) -> ServiceResult<Student> {
        self.students.get(student_id)
    }

    pub fn all_students(&self) -> ServiceResult<Vec<Student>> {
        self.students.all_current()
    }

    pub fn students_of_parent(&self, parent_email: &str) -> ServiceResult<Vec<Student>> {
        let wanted = parent_email.trim().to_lowercase();
        self.students
            .find(|s| s.parent_email.to_lowercase() == wanted)
    }

    // ---- enrollment --------------------------------------------------------

    pub fn request_enrollment(&self, student_id: &str, class_id: &str) -> ServiceResult<EnrollmentRequest> {
        let student = self.students.get(student_id)?;
        self.classes.get(class_id)?;

        if student.class_id.as_deref() == Some(class_id) {
            return Err(ServiceError::InvalidState(format!(
                "{} is already enrolled in this class",
                student.full_name()
            )));
        }

        let pending = self.enrollments.find(|r| {
            r.student_id == student_id && r.status == EnrollmentStatus::Pending
        })?;
        if !pending.is_empty() {
            return Err(ServiceError::duplicate(
                "EnrollmentRequest",
                format!("pending request for {}", student.full_name()),
            ));
        }

        self.enrollments.insert(EnrollmentRequest {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            class_id: class_id.to_string(),
            status: EnrollmentStatus::Pending,
            requested_at: Utc::now(),
            meta: VersionMeta::new(),
        })
    }

    fn decide(&self, request_id: &str, status: EnrollmentStatus) -> ServiceResult<EnrollmentRequest> {
        self.enrollments.update(request_id, |request| {
            if request.status != EnrollmentStatus::Pending {
                return Err(ServiceError::InvalidState(format!(
                    "Enrollment request {} was already {:?}",
                    request.id, request.status
                )));
            }
            request.status = status;
            Ok(())
        })
    }

    /// Accept a pending request and move the student into the class
    pub fn accept_enrollment(&self, request_id: &str) -> ServiceResult<(EnrollmentRequest, Student)> {
        let request = self.enrollments.get(request_id)?;
        if request.status == EnrollmentStatus::Pending {
            // The class may have been deleted since the request was made
            self.classes.get(&request.class_id)?;
        }

        let request = self.decide(request_id, EnrollmentStatus::Accepted)?;
        let class_id = request.class_id.clone();
        let student = self.students.update(&request.student_id, |student| {
            student.class_id = Some(class_id);
            Ok(())
        })?;
        Ok((request, student))
    }

    pub fn reject_enrollment(&self, request_id: &str) -> ServiceResult<EnrollmentRequest> {
        self.decide(request_id, EnrollmentStatus::Rejected)
    }

    pub fn pending_requests(&self) -> ServiceResult<Vec<EnrollmentRequest>> {
        self.enrollments
            .find(|r| r.status == EnrollmentStatus::Pending)
    }

    // ---- roster import -----------------------------------------------------

    /// Create missing classes by name and add every new student
    pub fn import_roster(&self, rows: &[RosterRow], year: &AcademicYear) -> ServiceResult<ImportSummary> {
        let mut summary = ImportSummary::default();

        for (index, row) in rows.iter().enumerate() {
            if self.students.current(row.student_id.trim())?.is_some() {
                summary.duplicates_skipped += 1;
                continue;
            }

            let draft = StudentDraft::new(&row.name, &row.surname, &row.parent_email)
                .with_id(&row.student_id);
            if let Err(errors) = draft.validate() {
                summary
                    .invalid_rows
                    .push(format!("row {}: {}", index + 1, crate::validation::describe(&errors)));
                continue;
            }

            let class = match self.find_class(&row.class_name, year)? {
                Some(class) => class,
                None => {
                    let draft = ClassDraft::new(&row.class_name, &year.to_string(), "To be assigned");
                    match self.insert_class(&draft) {
                        Ok(class) => {
                            summary.classes_created += 1;
                            class
                        }
                        Err(ServiceError::Validation(errors)) => {
                            summary
                                .invalid_rows
                                .push(format!("row {}: {}", index + 1, crate::validation::describe(&errors)));
                            continue;
                        }
                        Err(other) => return Err(other),
                    }
                }
            };

            self.add_student(&draft, Some(class.id.as_str()))?;
            summary.students_added += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn year() -> AcademicYear {
        AcademicYear::parse("2023-2024").unwrap()
    }

    fn registry_with_class() -> (SchoolRegistry, SchoolClass) {
        let registry = SchoolRegistry::new();
        let class = registry
            .insert_class(&ClassDraft::new("3A", "2023-2024", "Via Roma 1"))
            .unwrap();
        (registry, class)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_academic_year_parse() {
        let year = year();
        assert_eq!(year.to_string(), "2023-2024");
        assert_eq!(year.first_day(), Some(date(2023, 9, 1)));
        assert_eq!(year.last_day(), Some(date(2024, 8, 31)));

        assert!(AcademicYear::parse("2023-2025").is_err());
        assert!(AcademicYear::parse("2023/2024").is_err());
        assert!(AcademicYear::parse("abcd-efgh").is_err());
    }

    #[test]
    fn test_academic_year_contains() {
        let year = year();
        assert!(year.contains(date(2023, 9, 1)));
        assert!(year.contains(date(2024, 8, 31)));
        assert!(!year.contains(date(2023, 8, 31)));
        assert!(!year.contains(date(2024, 9, 1)));
    }

    #[test]
    fn test_academic_year_serde_as_string() {
        let json = serde_json::to_string(&year()).unwrap();
        assert_eq!(json, "\"2023-2024\"");
        let back: AcademicYear = serde_json::from_str(&json).unwrap();
        assert_eq!(back, year());
        assert!(serde_json::from_str::<AcademicYear>("\"2023-2022\"").is_err());
    }

    #[test]
    fn test_class_name_unique_per_year() {
        let (registry, _) = registry_with_class();

        let err = registry
            .insert_class(&ClassDraft::new("3a", "2023-2024", "Via Roma 1"))
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate");

        // Same name, next year
        assert!(registry
            .insert_class(&ClassDraft::new("3A", "2024-2025", "Via Roma 1"))
            .is_ok());
        assert_eq!(registry.classes_for_year(&year()).unwrap().len(), 1);
    }

    #[test]
    fn test_class_validation() {
        let registry = SchoolRegistry::new();
        let err = registry
            .insert_class(&ClassDraft::new("", "2023", ""))
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["name", "address", "academic_year"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_delete_class_refused_with_students() {
        let (registry, class) = registry_with_class();
        let student = registry
            .add_student(&StudentDraft::new("John", "Smith", "parent@example.com"), Some(class.id.as_str()))
            .unwrap();

        let err = registry.delete_class(&class.id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        // Move the student out, then the class can go
        let other = registry
            .insert_class(&ClassDraft::new("3B", "2023-2024", "Via Roma 1"))
            .unwrap();
        let request = registry.request_enrollment(&student.id, &other.id).unwrap();
        registry.accept_enrollment(&request.id).unwrap();

        assert!(registry.delete_class(&class.id).is_ok());
    }

    #[test]
    fn test_teachings() {
        let (registry, class) = registry_with_class();
        let subjects = vec!["Maths".to_string(), "History".to_string(), "Maths".to_string()];

        let added = registry.assign_teachings(&class.id, &subjects).unwrap();
        assert_eq!(added, vec!["History", "Maths"]);

        let added = registry
            .assign_teachings(&class.id, &["Maths".to_string(), "Art".to_string()])
            .unwrap();
        assert_eq!(added, vec!["Art"]);

        let removed = registry
            .remove_teachings(&class.id, &["History".to_string(), "Latin".to_string()])
            .unwrap();
        assert_eq!(removed, vec!["History"]);

        let class = registry.get_class(&class.id).unwrap();
        assert_eq!(class.teachings.into_iter().collect::<Vec<_>>(), vec!["Art", "Maths"]);

        assert_eq!(registry.assign_teachings("nope", &["Art".to_string()]).unwrap_err().kind(), "not_found");
        assert_eq!(registry.assign_teachings(&class.id, &[]).unwrap_err().kind(), "validation");
    }

    #[test]
    fn test_enrollment_flow() {
        let (registry, class) = registry_with_class();
        let student = registry
            .add_student(&StudentDraft::new("Emma", "Johnson", "emma.parent@example.com"), None)
            .unwrap();

        let request = registry.request_enrollment(&student.id, &class.id).unwrap();
        assert_eq!(request.status, EnrollmentStatus::Pending);
        assert_eq!(registry.pending_requests().unwrap().len(), 1);

        // Only one pending request per student
        assert_eq!(
            registry.request_enrollment(&student.id, &class.id).unwrap_err().kind(),
            "duplicate"
        );

        let (request, student) = registry.accept_enrollment(&request.id).unwrap();
        assert_eq!(request.status, EnrollmentStatus::Accepted);
        assert_eq!(student.class_id.as_deref(), Some(class.id.as_str()));
        assert!(registry.pending_requests().unwrap().is_empty());

        // Deciding twice
        let err = registry.reject_enrollment(&request.id).unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert_eq!(registry.students_in_class(&class.id).unwrap().len(), 1);
    }

    #[test]
    fn test_reject_leaves_student_unassigned() {
        let (registry, class) = registry_with_class();
        let student = registry
            .add_student(&StudentDraft::new("Emma", "Johnson", "emma.parent@example.com"), None)
            .unwrap();

        let request = registry.request_enrollment(&student.id, &class.id).unwrap();
        registry.reject_enrollment(&request.id).unwrap();

        assert_eq!(registry.get_student(&student.id).unwrap().class_id, None);
        assert!(registry.accept_enrollment(&request.id).is_err());
    }

    #[test]
    fn test_student_explicit_id_must_be_unique() {
        let registry = SchoolRegistry::new();
        let draft = StudentDraft::new("John", "Smith", "parent@example.com").with_id("S001");
        registry.add_student(&draft, None).unwrap();
        assert_eq!(registry.add_student(&draft, None).unwrap_err().kind(), "duplicate");
        assert_eq!(registry.get_student("S001").unwrap().name, "John");
    }

    #[test]
    fn test_import_roster() {
        let registry = SchoolRegistry::new();
        let row = |id: &str, name: &str, email: &str, class: &str| RosterRow {
            student_id: id.to_string(),
            name: name.to_string(),
            surname: "Smith".to_string(),
            parent_email: email.to_string(),
            class_name: class.to_string(),
        };

        let rows = vec![
            row("S001", "John", "p1@example.com", "3A"),
            row("S002", "Emma", "p2@example.com", "3A"),
            row("S003", "Liam", "p3@example.com", "3B"),
            row("S001", "John", "p1@example.com", "3A"),
            row("S004", "Ava", "not-an-email", "3B"),
        ];

        let summary = registry.import_roster(&rows, &year()).unwrap();
        assert_eq!(summary.classes_created, 2);
        assert_eq!(summary.students_added, 3);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.invalid_rows.len(), 1);
        assert!(summary.invalid_rows[0].starts_with("row 5"));

        let class_3a = registry.find_class("3A", &year()).unwrap().unwrap();
        assert_eq!(registry.students_in_class(&class_3a.id).unwrap().len(), 2);
    }
}
