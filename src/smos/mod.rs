// SMOS - school management: users and roles, classes, register, report cards

pub mod justification;
pub mod monitoring;
pub mod notify;
pub mod register;
pub mod report_card;
pub mod school;
pub mod service;
pub mod user;

pub use justification::{AbsenceSummary, Justification, JustificationBook};
pub use monitoring::{monitor, StudentLoad};
pub use notify::{Email, Notifier, Outbox, ABSENCE_SUBJECT, NOTE_SUBJECT};
pub use register::{Absence, ClassRegister, DayRecord, Delay, DelayEntry, Note, RegisterDay};
pub use report_card::{LetterGrade, ReportCard, ReportCardBook, Semester, SubjectGrade};
pub use school::{
    AcademicYear, ClassDraft, EnrollmentRequest, EnrollmentStatus, ImportSummary, SchoolClass,
    SchoolRegistry, Student, StudentDraft,
};
pub use service::{sample, Smos, SMOS_SERVER};
pub use user::{NewUser, Role, RoleChange, Session, User, UserDirectory, UserEdit};
