// 📊 Report cards: one per student, academic year and semester

use super::school::AcademicYear;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Semester {
    First,
    Second,
}

impl Semester {
    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::First => "first",
            Semester::Second => "second",
        }
    }
}

impl std::fmt::Display for Semester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Semester {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" | "1" | "i" => Ok(Semester::First),
            "second" | "2" | "ii" => Ok(Semester::Second),
            other => Err(format!("Unknown semester: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub fn from_score(score: u8) -> Self {
        match score {
            90..=u8::MAX => LetterGrade::A,
            80..=89 => LetterGrade::B,
            70..=79 => LetterGrade::C,
            60..=69 => LetterGrade::D,
            _ => LetterGrade::F,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectGrade {
    pub subject: String,

    /// 0-100
    pub score: u8,

    pub letter: LetterGrade,
}

impl SubjectGrade {
    pub fn new(subject: &str, score: u8) -> Self {
        SubjectGrade {
            subject: subject.trim().to_string(),
            score,
            letter: LetterGrade::from_score(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCard {
    pub id: String,
    pub student_id: String,
    pub academic_year: AcademicYear,
    pub semester: Semester,

    /// Keyed by subject
    pub grades: BTreeMap<String, SubjectGrade>,

    pub comment: String,
    pub meta: VersionMeta,
}

impl Versioned for ReportCard {
    const ENTITY: &'static str = "ReportCard";

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

impl ReportCard {
    /// Mean score across subjects, None for an empty card
    pub fn average(&self) -> Option<f64> {
        if self.grades.is_empty() {
            return None;
        }
        let total: u32 = self.grades.values().map(|g| u32::from(g.score)).sum();
        Some(f64::from(total) / self.grades.len() as f64)
    }

    pub fn letter_for(&self, subject: &str) -> Option<LetterGrade> {
        self.grades.get(subject).map(|g| g.letter)
    }
}

fn check_card(grades: &[(String, u8)], comment: &str) -> ValidationResult {
    let mut checks = FieldChecks::new("ReportCard")
        .custom("grades", !grades.is_empty(), "At least one subject is required")
        .custom(
            "comment",
            comment.trim().chars().count() <= 1000,
            "Comment must be at most 1000 characters",
        );

    let mut seen = std::collections::HashSet::new();
    for (subject, score) in grades {
        checks = checks
            .non_empty("subject", subject)
            .range("score", *score, 0, 100)
            .custom(
                "subject",
                seen.insert(subject.trim().to_lowercase()),
                &format!("Subject {} is graded twice", subject.trim()),
            );
    }
    checks.finish()
}

fn to_grades(grades: &[(String, u8)]) -> BTreeMap<String, SubjectGrade> {
    grades
        .iter()
        .map(|(subject, score)| {
            let grade = SubjectGrade::new(subject, *score);
            (grade.subject.clone(), grade)
        })
        .collect()
}

#[derive(Clone, Default)]
pub struct ReportCardBook {
    cards: VersionedStore<ReportCard>,
}

impl ReportCardBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        student_id: &str,
        academic_year: AcademicYear,
        semester: Semester,
        grades: &[(String, u8)],
        comment: &str,
    ) -> ServiceResult<ReportCard> {
        check_card(grades, comment)?;

        if self.view(student_id, academic_year, semester)?.is_some() {
            return Err(ServiceError::duplicate(
                "ReportCard",
                format!("{} {} semester {}", student_id, semester, academic_year),
            ));
        }

        self.cards.insert(ReportCard {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            academic_year,
            semester,
            grades: to_grades(grades),
            comment: comment.trim().to_string(),
            meta: VersionMeta::new(),
        })
    }

    /// Replace grades and comment
    pub fn edit(&self, id: &str, grades: &[(String, u8)], comment: &str) -> ServiceResult<ReportCard> {
        check_card(grades, comment)?;
        self.cards.update(id, |card| {
            card.grades = to_grades(grades);
            card.comment = comment.trim().to_string();
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> ServiceResult<ReportCard> {
        self.cards.retire(id)
    }

    pub fn get(&self, id: &str) -> ServiceResult<ReportCard> {
        self.cards.get(id)
    }

    pub fn view(
        &self,
        student_id: &str,
        academic_year: AcademicYear,
        semester: Semester,
    ) -> ServiceResult<Option<ReportCard>> {
        Ok(self
            .cards
            .find(|c| {
                c.student_id == student_id && c.academic_year == academic_year && c.semester == semester
            })?
            .into_iter()
            .next())
    }

    /// Sorted by year, then semester
    pub fn for_student(&self, student_id: &str) -> ServiceResult<Vec<ReportCard>> {
        let mut cards = self.cards.find(|c| c.student_id == student_id)?;
        cards.sort_by_key(|c| (c.academic_year, c.semester));
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grades(list: &[(&str, u8)]) -> Vec<(String, u8)> {
        list.iter().map(|(s, g)| (s.to_string(), *g)).collect()
    }

    fn year() -> AcademicYear {
        AcademicYear::parse("2023-2024").unwrap()
    }

    #[test]
    fn test_letter_grades() {
        assert_eq!(LetterGrade::from_score(100), LetterGrade::A);
        assert_eq!(LetterGrade::from_score(90), LetterGrade::A);
        assert_eq!(LetterGrade::from_score(89), LetterGrade::B);
        assert_eq!(LetterGrade::from_score(70), LetterGrade::C);
        assert_eq!(LetterGrade::from_score(60), LetterGrade::D);
        assert_eq!(LetterGrade::from_score(59), LetterGrade::F);
    }

    #[test]
    fn test_insert_and_view() {
        let book = ReportCardBook::new();
        let card = book
            .insert(
                "S001",
                year(),
                Semester::First,
                &grades(&[("Maths", 85), ("History", 72), ("Art", 95)]),
                "Good progress",
            )
            .unwrap();

        assert_eq!(card.letter_for("Maths"), Some(LetterGrade::B));
        assert_eq!(card.letter_for("Latin"), None);
        let average = card.average().unwrap();
        assert!((average - 84.0).abs() < 1e-9);

        let viewed = book.view("S001", year(), Semester::First).unwrap().unwrap();
        assert_eq!(viewed.id, card.id);
        assert!(book.view("S001", year(), Semester::Second).unwrap().is_none());
    }

    #[test]
    fn test_one_card_per_semester() {
        let book = ReportCardBook::new();
        book.insert("S001", year(), Semester::First, &grades(&[("Maths", 85)]), "")
            .unwrap();

        let err = book
            .insert("S001", year(), Semester::First, &grades(&[("Maths", 90)]), "")
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate");

        assert!(book
            .insert("S001", year(), Semester::Second, &grades(&[("Maths", 90)]), "")
            .is_ok());
        assert_eq!(book.for_student("S001").unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_cards() {
        let book = ReportCardBook::new();

        let err = book.insert("S001", year(), Semester::First, &[], "").unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = book
            .insert("S001", year(), Semester::First, &grades(&[("Maths", 101), ("", 50)]), "")
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["score", "subject"]);
            }
            other => panic!("unexpected error: {}", other),
        }

        let long = "x".repeat(1001);
        let err = book
            .insert("S001", year(), Semester::First, &grades(&[("Maths", 80)]), &long)
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_edit_replaces_grades() {
        let book = ReportCardBook::new();
        let card = book
            .insert("S001", year(), Semester::First, &grades(&[("Maths", 55)]), "")
            .unwrap();

        let edited = book
            .edit(&card.id, &grades(&[("Maths", 65), ("Science", 70)]), "Recovered")
            .unwrap();
        assert_eq!(edited.grades.len(), 2);
        assert_eq!(edited.letter_for("Maths"), Some(LetterGrade::D));
        assert_eq!(edited.comment, "Recovered");

        book.delete(&card.id).unwrap();
        assert!(book.view("S001", year(), Semester::First).unwrap().is_none());
    }

    #[test]
    fn test_semester_parse() {
        assert_eq!("First".parse::<Semester>().unwrap(), Semester::First);
        assert_eq!("2".parse::<Semester>().unwrap(), Semester::Second);
        assert!("third".parse::<Semester>().is_err());
    }
}
