// 📐 Field validation shared by every entity
//
// Checks accumulate instead of short-circuiting so a form can report
// every bad field at once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// FIELD CHECKS
// ============================================================================

/// Accumulating field checker.
///
/// ```
/// use etour_smos::validation::FieldChecks;
///
/// let result = FieldChecks::new("Site")
///     .non_empty("name", "Colosseum")
///     .range("rating", 6, 1, 5)
///     .finish();
/// assert_eq!(result.unwrap_err().len(), 1);
/// ```
pub struct FieldChecks {
    context: String,
    errors: Vec<ValidationError>,
}

impl FieldChecks {
    pub fn new(context: &str) -> Self {
        FieldChecks {
            context: context.to_string(),
            errors: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, message: String) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message,
            context: self.context.clone(),
        });
    }

    pub fn non_empty(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self.push(field, "Required field is empty".to_string());
        }
        self
    }

    /// Trimmed length in characters must fall in `[min, max]`.
    pub fn length(mut self, field: &str, value: &str, min: usize, max: usize) -> Self {
        let len = value.trim().chars().count();
        if len < min || len > max {
            self.push(
                field,
                format!("Length must be between {} and {} characters, got {}", min, max, len),
            );
        }
        self
    }

    pub fn range<T>(mut self, field: &str, value: T, min: T, max: T) -> Self
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            self.push(field, format!("Must be between {} and {}, got {}", min, max, value));
        }
        self
    }

    pub fn email(mut self, field: &str, value: &str) -> Self {
        if !is_valid_email(value) {
            self.push(field, format!("'{}' is not a valid e-mail address", value.trim()));
        }
        self
    }

    pub fn phone(mut self, field: &str, value: &str) -> Self {
        if !is_valid_phone(value) {
            self.push(field, format!("'{}' is not a valid phone number", value.trim()));
        }
        self
    }

    pub fn not_in_future(mut self, field: &str, date: NaiveDate, today: NaiveDate) -> Self {
        if date > today {
            self.push(field, format!("Date {} is in the future", date));
        }
        self
    }

    pub fn custom(mut self, field: &str, ok: bool, message: &str) -> Self {
        if !ok {
            self.push(field, message.to_string());
        }
        self
    }

    pub fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

// ============================================================================
// FORMAT HELPERS
// ============================================================================

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    let mut parts = value.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return false,
    };

    if local.is_empty() || domain.contains(char::is_whitespace) || local.contains(char::is_whitespace) {
        return false;
    }

    match domain.find('.') {
        Some(_) => !domain.starts_with('.') && !domain.ends_with('.'),
        None => false,
    }
}

/// Optional leading `+`, then 6-15 digits. Spaces and dashes are ignored.
pub fn is_valid_phone(value: &str) -> bool {
    let compact: String = value
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Render a list of validation errors as one line per error.
pub fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_accumulate() {
        let result = FieldChecks::new("Point")
            .non_empty("name", "  ")
            .range("capacity", 0u32, 1, 1000)
            .length("city", "Rome", 2, 40)
            .finish();

        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[1].field, "capacity");
        assert_eq!(errors[0].context, "Point");
    }

    #[test]
    fn test_all_pass() {
        let result = FieldChecks::new("User")
            .email("email", "mario.rossi@school.it")
            .phone("cell", "+39 333-1234567")
            .finish();
        assert!(result.is_ok());
    }

    #[test]
    fn test_email_formats() {
        assert!(is_valid_email("parent.smith@example.com"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user@example."));
    }

    #[test]
    fn test_phone_formats() {
        assert!(is_valid_phone("0612345678"));
        assert!(is_valid_phone("+39 06 1234 5678"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("06-ABC-1234"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn test_future_date_rejected() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let tomorrow = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();

        assert!(FieldChecks::new("Absence").not_in_future("date", today, today).finish().is_ok());
        let errors = FieldChecks::new("Absence")
            .not_in_future("date", tomorrow, today)
            .finish()
            .unwrap_err();
        assert_eq!(errors[0].to_string(), "[Absence] date: Date 2024-03-11 is in the future");
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        assert!(FieldChecks::new("Note").length("text", "àèìòù", 5, 5).finish().is_ok());
    }
}
