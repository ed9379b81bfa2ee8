// 🎓 SMOS service facade
//
// Every operation:
// 1. asks the SMOS server link (may be interrupted)
// 2. checks the caller's roles
// 3. validates and mutates
// 4. records an audit event and logs
//
// Role rules: user, class, enrollment, register and justification management
// is administrator-only; notes and report cards are open to teachers too;
// read views of a student's data are open to administrators, teachers, the
// student and the student's parents.

use super::justification::{AbsenceSummary, Justification, JustificationBook};
use super::monitoring::{monitor, StudentLoad};
use super::notify::{Email, Notifier, Outbox, ABSENCE_SUBJECT, NOTE_SUBJECT};
use super::register::{ClassRegister, DayRecord, Delay, DelayEntry, Absence, Note, RegisterDay};
use super::report_card::{ReportCard, ReportCardBook, Semester};
use super::school::{
    AcademicYear, ClassDraft, EnrollmentRequest, ImportSummary, SchoolClass, SchoolRegistry,
    Student, StudentDraft,
};
use super::user::{NewUser, Role, RoleChange, Session, User, UserDirectory, UserEdit};
use crate::config::{AppConfig, SmosConfig};
use crate::db::{AuditTrail, Event, RosterRow};
use crate::error::{ServiceError, ServiceResult};
use crate::link::ServerLink;
use crate::validation::FieldChecks;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::json;

pub const SMOS_SERVER: &str = "SMOS";

const STAFF: [Role; 2] = [Role::Administrator, Role::Teacher];

/// Accounts created by [`Smos::with_sample_data`], as (username, password)
pub mod sample {
    pub const ADMIN: (&str, &str) = ("admin.smos", "admin123");
    pub const TEACHER: (&str, &str) = ("prof.verdi", "teacher1");
    pub const PARENT: (&str, &str) = ("anna.smith", "parent1");
    pub const STUDENT: (&str, &str) = ("john.smith", "student1");

    /// Has no roles yet
    pub const NEWCOMER: (&str, &str) = ("luca.neri", "welcome1");

    pub const STUDENT_ID: &str = "S001";
    pub const FLAGGED_STUDENT_ID: &str = "S002";
    pub const UNASSIGNED_STUDENT_ID: &str = "S004";
}

pub struct Smos {
    users: UserDirectory,
    school: SchoolRegistry,
    register: ClassRegister,
    justifications: JustificationBook,
    report_cards: ReportCardBook,
    notifier: Box<dyn Notifier>,
    link: ServerLink,
    audit: AuditTrail,
    config: SmosConfig,
    year: AcademicYear,
    today: Option<NaiveDate>,
}

impl Smos {
    pub fn new(
        config: SmosConfig,
        link: ServerLink,
        audit: AuditTrail,
        notifier: Box<dyn Notifier>,
    ) -> ServiceResult<Self> {
        let year = AcademicYear::parse(&config.school_year).map_err(|e| ServiceError::Validation(vec![e]))?;

        Ok(Smos {
            users: UserDirectory::new(),
            school: SchoolRegistry::new(),
            register: ClassRegister::new(),
            justifications: JustificationBook::new(),
            report_cards: ReportCardBook::new(),
            notifier,
            link,
            audit,
            config,
            year,
            today: None,
        })
    }

    /// Sample school with an in-memory outbox
    pub fn with_sample_data(config: &AppConfig) -> ServiceResult<Self> {
        Self::with_sample_data_using(config, Box::new(Outbox::new()))
    }

    /// Sample school delivering notifications through `notifier`.
    ///
    /// Seeding bypasses the link and the audit trail.
    pub fn with_sample_data_using(config: &AppConfig, notifier: Box<dyn Notifier>) -> ServiceResult<Self> {
        let smos = Smos::new(
            config.smos.clone(),
            ServerLink::from_config(SMOS_SERVER, &config.link),
            AuditTrail::new(),
            notifier,
        )?;
        smos.seed()
    }

    /// The sample school runs on a pinned day inside its school year, after the seeded history
    fn seed(mut self) -> ServiceResult<Self> {
        let account = |(username, password): (&str, &str), name: &str, surname: &str, email: &str, roles: &[Role]| NewUser {
            username: username.to_string(),
            password: password.to_string(),
            name: name.to_string(),
            surname: surname.to_string(),
            email: email.to_string(),
            cell: None,
            roles: roles.iter().copied().collect(),
        };

        for user in [
            account(sample::ADMIN, "Laura", "Bianchi", "l.bianchi@smos.edu", &[Role::Administrator]),
            account(sample::TEACHER, "Giuseppe", "Verdi", "g.verdi@smos.edu", &[Role::Teacher]),
            account(sample::PARENT, "Anna", "Smith", "parent.smith@example.com", &[Role::Parent]),
            account(sample::STUDENT, "John", "Smith", "john.smith@smos.edu", &[Role::Student]),
            account(sample::NEWCOMER, "Luca", "Neri", "l.neri@smos.edu", &[]),
        ] {
            self.users.create(&user)?;
        }

        let year = self.year.to_string();
        let class_3a = self.school.insert_class(&ClassDraft::new("3A", &year, "Via Roma 1, Salerno"))?;
        let class_3b = self.school.insert_class(&ClassDraft::new("3B", &year, "Via Roma 1, Salerno"))?;
        for class in [&class_3a, &class_3b] {
            self.school.assign_teachings(
                &class.id,
                &["Mathematics".to_string(), "History".to_string(), "English".to_string()],
            )?;
        }

        for (id, name, surname, email, class) in [
            ("S001", "John", "Smith", "parent.smith@example.com", Some(&class_3a)),
            ("S002", "Emma", "Johnson", "emma.parent@example.com", Some(&class_3a)),
            ("S003", "Liam", "Brown", "brown.family@example.com", Some(&class_3b)),
            ("S004", "Ava", "Davis", "davis.home@example.com", None),
        ] {
            self.school.add_student(
                &StudentDraft::new(name, surname, email).with_id(id),
                class.map(|c| c.id.as_str()),
            )?;
        }
        self.school.request_enrollment(sample::UNASSIGNED_STUDENT_ID, &class_3b.id)?;

        // October of the school year: Emma is over both monitoring thresholds
        let start = self
            .year
            .first_day()
            .map(|d| d + Duration::days(30))
            .ok_or_else(|| ServiceError::InvalidState(format!("No calendar for {}", self.year)))?;
        let flagged_absences = self.config.absence_threshold.saturating_add(2);
        let flagged_notes = self.config.note_threshold.saturating_add(1);
        let span = flagged_absences.max(flagged_notes);
        let last_day = self
            .year
            .last_day()
            .ok_or_else(|| ServiceError::InvalidState(format!("No calendar for {}", self.year)))?;
        let span_days = i64::try_from(span)
            .ok()
            .filter(|days| *days <= 366 && start + Duration::days(*days) <= last_day)
            .ok_or_else(|| {
                ServiceError::InvalidState(format!(
                    "Monitoring thresholds {}/{} do not fit in the school year {}",
                    self.config.absence_threshold, self.config.note_threshold, self.year
                ))
            })?;
        let seed_today = start + Duration::days(span_days.max(60));
        let teacher = sample::TEACHER.0;

        for day in 0..flagged_absences {
            let date = start + Duration::days(day as i64);
            self.register
                .record_day(&class_3a.id, date, seed_today, &[sample::FLAGGED_STUDENT_ID.to_string()], &[])?;
        }
        for day in 0..flagged_notes {
            self.register.insert_note(
                sample::FLAGGED_STUDENT_ID,
                &class_3a.id,
                teacher,
                start + Duration::days(day as i64),
                seed_today,
                "Repeatedly disturbed the lesson",
            )?;
        }

        let john = self.register.record_day(
            &class_3a.id,
            start + Duration::days(14),
            seed_today,
            &[sample::STUDENT_ID.to_string()],
            &[],
        )?;
        if let Some(first) = john.absences.first() {
            let justification =
                self.justifications
                    .insert(first, "Medical visit", first.date + Duration::days(1), seed_today, sample::ADMIN.0)?;
            self.register.mark_justified(&first.id, &justification.id)?;
        }
        self.register.record_day(
            &class_3a.id,
            start + Duration::days(21),
            seed_today,
            &[sample::STUDENT_ID.to_string()],
            &[],
        )?;

        self.report_cards.insert(
            sample::STUDENT_ID,
            self.year,
            Semester::First,
            &[
                ("Mathematics".to_string(), 78),
                ("History".to_string(), 91),
                ("English".to_string(), 84),
            ],
            "Steady improvement in mathematics",
        )?;

        self.today = Some(seed_today);
        Ok(self)
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    /// The pinned day, or the current UTC date
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Pin "today" (future-date checks) instead of the system clock
    pub fn set_today(&mut self, today: Option<NaiveDate>) {
        self.today = today;
    }

    fn guard(&mut self, session: &Session, roles: &[Role], action: &str) -> ServiceResult<()> {
        self.link.check()?;
        self.refresh(session, action)?.require_any(roles, action)
    }

    /// The session as the directory sees it now: roles can change, accounts can be deleted
    fn refresh(&self, session: &Session, action: &str) -> ServiceResult<Session> {
        let user = match self.users.get(&session.user_id) {
            Ok(user) => user,
            Err(ServiceError::NotFound { .. }) => {
                return Err(ServiceError::unauthorized(
                    action,
                    format!("the account of {} no longer exists", session.username),
                ))
            }
            Err(err) => return Err(err),
        };

        Ok(Session {
            user_id: user.id,
            username: user.username,
            roles: user.roles,
        })
    }

    fn record(&self, event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value, session: &Session) {
        self.audit
            .record(Event::new(event_type, entity_type, entity_id, data, &session.username));
    }

    fn rejected<T>(&self, operation: &str, session: &Session, result: ServiceResult<T>) -> ServiceResult<T> {
        if let Err(err) = &result {
            if !err.is_connection_interrupted() {
                tracing::warn!(operation, actor = %session.username, kind = err.kind(), "SMOS request rejected");
            }
        }
        result
    }

    /// Administrators and teachers see everyone; students themselves; parents their children
    fn check_can_view(&self, session: &Session, student: &Student, action: &str) -> ServiceResult<()> {
        let session = self.refresh(session, action)?;
        if session.has_any(&STAFF) {
            return Ok(());
        }

        let user = self.users.get(&session.user_id)?;
        let own = session.has_role(Role::Student)
            && user.name.eq_ignore_ascii_case(&student.name)
            && user.surname.eq_ignore_ascii_case(&student.surname);
        let child = session.has_role(Role::Parent) && user.email.eq_ignore_ascii_case(&student.parent_email);

        if own || child {
            Ok(())
        } else {
            Err(ServiceError::unauthorized(
                action,
                format!("{} has no access to {}'s records", session.username, student.full_name()),
            ))
        }
    }

    fn notify(&self, email: Email) -> bool {
        let to = email.to.clone();
        match self.notifier.send(email) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(to = %to, error = %err, "notification not delivered");
                false
            }
        }
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    pub fn login(&mut self, username: &str, password: &str) -> ServiceResult<Session> {
        self.link.check()?;
        let session = match self.users.authenticate(username, password) {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(username, "login failed");
                return Err(err);
            }
        };

        self.record("user_logged_in", "session", &session.user_id, json!({}), &session);
        tracing::info!(actor = %session.username, "logged in");
        Ok(session)
    }

    pub fn logout(&mut self, session: &Session) {
        self.record("user_logged_out", "session", &session.user_id, json!({}), session);
        tracing::info!(actor = %session.username, "logged out");
    }

    // ========================================================================
    // USERS & ROLES
    // ========================================================================

    pub fn create_user(&mut self, session: &Session, new_user: &NewUser) -> ServiceResult<User> {
        self.guard(session, &[Role::Administrator], "create a user")?;
        let result = self.users.create(new_user);
        let user = self.rejected("create_user", session, result)?;

        self.record(
            "user_created",
            "user",
            &user.id,
            json!({ "username": user.username, "roles": user.roles }),
            session,
        );
        tracing::info!(actor = %session.username, username = %user.username, "user created");
        Ok(user)
    }

    pub fn edit_user(&mut self, session: &Session, user_id: &str, edit: &UserEdit) -> ServiceResult<User> {
        self.guard(session, &[Role::Administrator], "edit a user")?;
        let result = self.users.edit(user_id, edit);
        let user = self.rejected("edit_user", session, result)?;

        self.record("user_edited", "user", user_id, json!({ "version": user.meta.version }), session);
        tracing::info!(actor = %session.username, username = %user.username, "user edited");
        Ok(user)
    }

    /// Administrators cannot delete their own account
    pub fn delete_user(&mut self, session: &Session, user_id: &str) -> ServiceResult<User> {
        self.guard(session, &[Role::Administrator], "delete a user")?;
        let result = if session.user_id == user_id {
            Err(ServiceError::InvalidState("You cannot delete your own account".to_string()))
        } else {
            self.users.delete(user_id)
        };
        let user = self.rejected("delete_user", session, result)?;

        self.record("user_deleted", "user", user_id, json!({ "username": user.username }), session);
        tracing::info!(actor = %session.username, username = %user.username, "user deleted");
        Ok(user)
    }

    pub fn list_users(&mut self, session: &Session) -> ServiceResult<Vec<User>> {
        self.guard(session, &[Role::Administrator], "list users")?;
        self.users.list()
    }

    pub fn update_roles(
        &mut self,
        session: &Session,
        user_id: &str,
        assign: &[Role],
        remove: &[Role],
    ) -> ServiceResult<RoleChange> {
        self.guard(session, &[Role::Administrator], "change roles")?;
        let result = self.users.update_roles(user_id, assign, remove);
        let change = self.rejected("update_roles", session, result)?;

        if !change.is_empty() {
            self.record(
                "roles_updated",
                "user",
                user_id,
                json!({ "assigned": change.assigned, "removed": change.removed }),
                session,
            );
        }
        tracing::info!(
            actor = %session.username,
            user_id,
            assigned = change.assigned.len(),
            removed = change.removed.len(),
            "roles updated"
        );
        Ok(change)
    }

    pub fn find_user(&self, username: &str) -> ServiceResult<User> {
        self.users
            .find_by_username(username)?
            .ok_or_else(|| ServiceError::not_found("User", username))
    }

    // ========================================================================
    // CLASSES & TEACHINGS
    // ========================================================================

    pub fn insert_class(&mut self, session: &Session, draft: &ClassDraft) -> ServiceResult<SchoolClass> {
        self.guard(session, &[Role::Administrator], "insert a class")?;
        let result = self.school.insert_class(draft);
        let class = self.rejected("insert_class", session, result)?;

        self.record(
            "class_inserted",
            "class",
            &class.id,
            json!({ "name": class.name, "academic_year": class.academic_year }),
            session,
        );
        tracing::info!(actor = %session.username, class = %class.name, "class inserted");
        Ok(class)
    }

    pub fn delete_class(&mut self, session: &Session, class_id: &str) -> ServiceResult<SchoolClass> {
        self.guard(session, &[Role::Administrator], "delete a class")?;
        let result = self.school.delete_class(class_id);
        let class = self.rejected("delete_class", session, result)?;

        self.record("class_deleted", "class", class_id, json!({ "name": class.name }), session);
        tracing::info!(actor = %session.username, class = %class.name, "class deleted");
        Ok(class)
    }

    pub fn classes_for_year(&mut self, session: &Session, year: &AcademicYear) -> ServiceResult<Vec<SchoolClass>> {
        self.guard(session, &Role::ALL, "view classes")?;
        self.school.classes_for_year(year)
    }

    pub fn assign_teachings(
        &mut self,
        session: &Session,
        class_id: &str,
        subjects: &[String],
    ) -> ServiceResult<Vec<String>> {
        self.guard(session, &[Role::Administrator], "assign teachings")?;
        let result = self.school.assign_teachings(class_id, subjects);
        let added = self.rejected("assign_teachings", session, result)?;

        self.record("teachings_assigned", "class", class_id, json!({ "added": added }), session);
        tracing::info!(actor = %session.username, class_id, added = added.len(), "teachings assigned");
        Ok(added)
    }

    pub fn remove_teachings(
        &mut self,
        session: &Session,
        class_id: &str,
        subjects: &[String],
    ) -> ServiceResult<Vec<String>> {
        self.guard(session, &[Role::Administrator], "remove teachings")?;
        let result = self.school.remove_teachings(class_id, subjects);
        let removed = self.rejected("remove_teachings", session, result)?;

        self.record("teachings_removed", "class", class_id, json!({ "removed": removed }), session);
        tracing::info!(actor = %session.username, class_id, removed = removed.len(), "teachings removed");
        Ok(removed)
    }

    // ========================================================================
    // STUDENTS & ENROLLMENT
    // ========================================================================

    pub fn add_student(
        &mut self,
        session: &Session,
        draft: &StudentDraft,
        class_id: Option<&str>,
    ) -> ServiceResult<Student> {
        self.guard(session, &[Role::Administrator], "add a student")?;
        let result = self.school.add_student(draft, class_id);
        let student = self.rejected("add_student", session, result)?;

        self.record(
            "student_added",
            "student",
            &student.id,
            json!({ "name": student.full_name(), "class_id": student.class_id }),
            session,
        );
        tracing::info!(actor = %session.username, student = %student.id, "student added");
        Ok(student)
    }

    pub fn request_enrollment(
        &mut self,
        session: &Session,
        student_id: &str,
        class_id: &str,
    ) -> ServiceResult<EnrollmentRequest> {
        self.guard(session, &[Role::Administrator], "request an enrollment")?;
        let result = self.school.request_enrollment(student_id, class_id);
        let request = self.rejected("request_enrollment", session, result)?;

        self.record(
            "enrollment_requested",
            "enrollment",
            &request.id,
            json!({ "student_id": student_id, "class_id": class_id }),
            session,
        );
        tracing::info!(actor = %session.username, student = student_id, "enrollment requested");
        Ok(request)
    }

    pub fn accept_enrollment(&mut self, session: &Session, request_id: &str) -> ServiceResult<Student> {
        self.guard(session, &[Role::Administrator], "accept an enrollment")?;
        let result = self.school.accept_enrollment(request_id);
        let (request, student) = self.rejected("accept_enrollment", session, result)?;

        self.record(
            "enrollment_accepted",
            "enrollment",
            request_id,
            json!({ "student_id": request.student_id, "class_id": request.class_id }),
            session,
        );
        tracing::info!(actor = %session.username, student = %student.id, "enrollment accepted");
        Ok(student)
    }

    pub fn reject_enrollment(&mut self, session: &Session, request_id: &str) -> ServiceResult<EnrollmentRequest> {
        self.guard(session, &[Role::Administrator], "reject an enrollment")?;
        let result = self.school.reject_enrollment(request_id);
        let request = self.rejected("reject_enrollment", session, result)?;

        self.record(
            "enrollment_rejected",
            "enrollment",
            request_id,
            json!({ "student_id": request.student_id }),
            session,
        );
        tracing::info!(actor = %session.username, student = %request.student_id, "enrollment rejected");
        Ok(request)
    }

    pub fn pending_enrollments(&mut self, session: &Session) -> ServiceResult<Vec<EnrollmentRequest>> {
        self.guard(session, &[Role::Administrator], "view enrollment requests")?;
        self.school.pending_requests()
    }

    pub fn student(&mut self, session: &Session, student_id: &str) -> ServiceResult<Student> {
        self.link.check()?;
        let student = self.school.get_student(student_id)?;
        self.check_can_view(session, &student, "view a student")?;
        Ok(student)
    }

    // ========================================================================
    // CLASS REGISTER
    // ========================================================================

    /// Record a day's absences and delays, then e-mail the parents of absent students
    pub fn record_register_day(
        &mut self,
        session: &Session,
        class_id: &str,
        date: NaiveDate,
        absent_ids: &[String],
        delays: &[DelayEntry],
    ) -> ServiceResult<DayRecord> {
        self.guard(session, &[Role::Administrator], "enter absences")?;
        let today = self.today();
        let result = self.enter_day(class_id, date, today, absent_ids, delays);
        let (class, record) = self.rejected("record_register_day", session, result)?;

        let mut notified = 0;
        for absence in &record.absences {
            let student = self.school.get_student(&absence.student_id)?;
            let email = Email::new(
                &student.parent_email,
                ABSENCE_SUBJECT,
                format!("{} was absent from class {} on {}.", student.full_name(), class.name, date),
            );
            if self.notify(email) {
                notified += 1;
            }
        }

        self.record(
            "register_day_recorded",
            "class",
            class_id,
            json!({
                "date": date,
                "absences": record.absences.len(),
                "delays": record.delays.len(),
                "parents_notified": notified,
            }),
            session,
        );
        tracing::info!(
            actor = %session.username,
            class = %class.name,
            %date,
            absences = record.absences.len(),
            delays = record.delays.len(),
            "register day recorded"
        );
        Ok(record)
    }

    fn enter_day(
        &self,
        class_id: &str,
        date: NaiveDate,
        today: NaiveDate,
        absent_ids: &[String],
        delays: &[DelayEntry],
    ) -> ServiceResult<(SchoolClass, DayRecord)> {
        let class = self.school.get_class(class_id)?;
        let enrolled: Vec<String> = self
            .school
            .students_in_class(class_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut checks = FieldChecks::new("Register");
        let listed = absent_ids
            .iter()
            .map(|id| ("absences", id.trim()))
            .chain(delays.iter().map(|d| ("delays", d.student_id.trim())));
        for (field, id) in listed {
            checks = checks.custom(
                field,
                enrolled.iter().any(|e| e == id),
                &format!("Student {} is not enrolled in class {}", id, class.name),
            );
        }
        checks.finish()?;

        let record = self.register.record_day(class_id, date, today, absent_ids, delays)?;
        Ok((class, record))
    }

    pub fn edit_delay(&mut self, session: &Session, delay_id: &str, entry_time: NaiveTime) -> ServiceResult<Delay> {
        self.guard(session, &[Role::Administrator], "edit a delay")?;
        let result = self.register.edit_delay(delay_id, entry_time);
        let delay = self.rejected("edit_delay", session, result)?;

        self.record("delay_edited", "delay", delay_id, json!({ "entry_time": entry_time }), session);
        tracing::info!(actor = %session.username, delay_id, %entry_time, "delay edited");
        Ok(delay)
    }

    pub fn delete_delay(&mut self, session: &Session, delay_id: &str) -> ServiceResult<Delay> {
        self.guard(session, &[Role::Administrator], "delete a delay")?;
        let result = self.register.delete_delay(delay_id);
        let delay = self.rejected("delete_delay", session, result)?;

        self.record("delay_deleted", "delay", delay_id, json!({ "student_id": delay.student_id }), session);
        tracing::info!(actor = %session.username, delay_id, "delay deleted");
        Ok(delay)
    }

    pub fn delete_absence(&mut self, session: &Session, absence_id: &str) -> ServiceResult<Absence> {
        self.guard(session, &[Role::Administrator], "delete an absence")?;
        let result = self.register.delete_absence(absence_id);
        let absence = self.rejected("delete_absence", session, result)?;

        self.record(
            "absence_deleted",
            "absence",
            absence_id,
            json!({ "student_id": absence.student_id, "date": absence.date }),
            session,
        );
        tracing::info!(actor = %session.username, absence_id, "absence deleted");
        Ok(absence)
    }

    /// Disciplinary note on an enrolled student; the parents are notified
    pub fn insert_note(
        &mut self,
        session: &Session,
        student_id: &str,
        date: NaiveDate,
        description: &str,
    ) -> ServiceResult<Note> {
        self.guard(session, &STAFF, "insert a note")?;
        let today = self.today();
        let result = self.school.get_student(student_id).and_then(|student| {
            let class_id = student.class_id.clone().ok_or_else(|| {
                ServiceError::InvalidState(format!("{} is not enrolled in any class", student.full_name()))
            })?;
            let note = self
                .register
                .insert_note(student_id, &class_id, &session.username, date, today, description)?;
            Ok((student, note))
        });
        let (student, note) = self.rejected("insert_note", session, result)?;

        let notified = self.notify(Email::new(
            &student.parent_email,
            NOTE_SUBJECT,
            format!("A note was recorded for {} on {}: {}", student.full_name(), date, note.description),
        ));

        self.record(
            "note_inserted",
            "note",
            &note.id,
            json!({ "student_id": student_id, "date": date, "parent_notified": notified }),
            session,
        );
        tracing::info!(actor = %session.username, student = student_id, "note inserted");
        Ok(note)
    }

    pub fn edit_note(&mut self, session: &Session, note_id: &str, description: &str) -> ServiceResult<Note> {
        self.guard(session, &STAFF, "edit a note")?;
        let result = self.register.edit_note(note_id, description);
        let note = self.rejected("edit_note", session, result)?;

        self.record("note_edited", "note", note_id, json!({ "version": note.meta.version }), session);
        tracing::info!(actor = %session.username, note_id, "note edited");
        Ok(note)
    }

    pub fn delete_note(&mut self, session: &Session, note_id: &str) -> ServiceResult<Note> {
        self.guard(session, &STAFF, "delete a note")?;
        let result = self.register.delete_note(note_id);
        let note = self.rejected("delete_note", session, result)?;

        self.record("note_deleted", "note", note_id, json!({ "student_id": note.student_id }), session);
        tracing::info!(actor = %session.username, note_id, "note deleted");
        Ok(note)
    }

    pub fn register_for_class(
        &mut self,
        session: &Session,
        class_id: &str,
        date: NaiveDate,
    ) -> ServiceResult<RegisterDay> {
        self.guard(session, &STAFF, "view the register")?;
        self.school.get_class(class_id)?;
        self.register.entries_for_class_on(class_id, date)
    }

    pub fn absences_for_student(&mut self, session: &Session, student_id: &str) -> ServiceResult<Vec<Absence>> {
        let student = self.student(session, student_id)?;
        self.register.absences_for_student(&student.id)
    }

    // ========================================================================
    // JUSTIFICATIONS
    // ========================================================================

    pub fn insert_justification(
        &mut self,
        session: &Session,
        absence_id: &str,
        reason: &str,
        date: NaiveDate,
    ) -> ServiceResult<Justification> {
        self.guard(session, &[Role::Administrator], "justify an absence")?;
        let today = self.today();
        let result = self.register.absence(absence_id).and_then(|absence| {
            if absence.is_justified() {
                return Err(ServiceError::InvalidState(format!(
                    "Absence of {} on {} is already justified",
                    absence.student_id, absence.date
                )));
            }
            let justification = self
                .justifications
                .insert(&absence, reason, date, today, &session.username)?;
            if let Err(err) = self.register.mark_justified(absence_id, &justification.id) {
                self.justifications.delete(&justification.id)?;
                return Err(err);
            }
            Ok(justification)
        });
        let justification = self.rejected("insert_justification", session, result)?;

        self.record(
            "justification_inserted",
            "justification",
            &justification.id,
            json!({ "absence_id": absence_id, "reason": justification.reason }),
            session,
        );
        tracing::info!(actor = %session.username, absence_id, "absence justified");
        Ok(justification)
    }

    pub fn edit_justification(
        &mut self,
        session: &Session,
        justification_id: &str,
        reason: &str,
        date: NaiveDate,
    ) -> ServiceResult<Justification> {
        self.guard(session, &[Role::Administrator], "edit a justification")?;
        let today = self.today();
        let result = self
            .justifications
            .get(justification_id)
            .and_then(|j| self.register.absence(&j.absence_id))
            .and_then(|absence| {
                self.justifications
                    .edit(justification_id, &absence, reason, date, today)
            });
        let justification = self.rejected("edit_justification", session, result)?;

        self.record(
            "justification_edited",
            "justification",
            justification_id,
            json!({ "reason": justification.reason, "date": justification.date }),
            session,
        );
        tracing::info!(actor = %session.username, justification_id, "justification edited");
        Ok(justification)
    }

    /// Delete a justification; its absence becomes unjustified again
    pub fn delete_justification(&mut self, session: &Session, justification_id: &str) -> ServiceResult<Justification> {
        self.guard(session, &[Role::Administrator], "delete a justification")?;
        let result = self.justifications.delete(justification_id).and_then(|j| {
            self.register.clear_justification(&j.absence_id)?;
            Ok(j)
        });
        let justification = self.rejected("delete_justification", session, result)?;

        self.record(
            "justification_deleted",
            "justification",
            justification_id,
            json!({ "absence_id": justification.absence_id }),
            session,
        );
        tracing::info!(actor = %session.username, justification_id, "justification deleted");
        Ok(justification)
    }

    pub fn justifications_for_student(
        &mut self,
        session: &Session,
        student_id: &str,
    ) -> ServiceResult<Vec<Justification>> {
        let student = self.student(session, student_id)?;
        self.justifications.for_student(&student.id)
    }

    pub fn absence_summary(&mut self, session: &Session, student_id: &str) -> ServiceResult<AbsenceSummary> {
        let absences = self.absences_for_student(session, student_id)?;
        Ok(AbsenceSummary::from_absences(&absences))
    }

    // ========================================================================
    // REPORT CARDS
    // ========================================================================

    pub fn insert_report_card(
        &mut self,
        session: &Session,
        student_id: &str,
        year: AcademicYear,
        semester: Semester,
        grades: &[(String, u8)],
        comment: &str,
    ) -> ServiceResult<ReportCard> {
        self.guard(session, &STAFF, "insert a report card")?;
        let result = self
            .school
            .get_student(student_id)
            .and_then(|_| self.report_cards.insert(student_id, year, semester, grades, comment));
        let card = self.rejected("insert_report_card", session, result)?;

        self.record(
            "report_card_inserted",
            "report_card",
            &card.id,
            json!({ "student_id": student_id, "academic_year": year, "semester": semester }),
            session,
        );
        tracing::info!(actor = %session.username, student = student_id, %semester, "report card inserted");
        Ok(card)
    }

    pub fn edit_report_card(
        &mut self,
        session: &Session,
        card_id: &str,
        grades: &[(String, u8)],
        comment: &str,
    ) -> ServiceResult<ReportCard> {
        self.guard(session, &STAFF, "edit a report card")?;
        let result = self.report_cards.edit(card_id, grades, comment);
        let card = self.rejected("edit_report_card", session, result)?;

        self.record(
            "report_card_edited",
            "report_card",
            card_id,
            json!({ "version": card.meta.version, "average": card.average() }),
            session,
        );
        tracing::info!(actor = %session.username, card_id, "report card edited");
        Ok(card)
    }

    pub fn delete_report_card(&mut self, session: &Session, card_id: &str) -> ServiceResult<ReportCard> {
        self.guard(session, &STAFF, "delete a report card")?;
        let result = self.report_cards.delete(card_id);
        let card = self.rejected("delete_report_card", session, result)?;

        self.record(
            "report_card_deleted",
            "report_card",
            card_id,
            json!({ "student_id": card.student_id }),
            session,
        );
        tracing::info!(actor = %session.username, card_id, "report card deleted");
        Ok(card)
    }

    pub fn view_report_card(
        &mut self,
        session: &Session,
        student_id: &str,
        year: AcademicYear,
        semester: Semester,
    ) -> ServiceResult<ReportCard> {
        let student = self.student(session, student_id)?;
        self.report_cards
            .view(&student.id, year, semester)?
            .ok_or_else(|| {
                ServiceError::not_found("ReportCard", &format!("{} {} semester {}", student.id, semester, year))
            })
    }

    // ========================================================================
    // MONITORING & IMPORT
    // ========================================================================

    /// Students over both the absence and the note threshold this school year
    pub fn monitor_students(&mut self, session: &Session) -> ServiceResult<Vec<StudentLoad>> {
        self.guard(session, &[Role::Administrator], "monitor students")?;
        let flagged = monitor(
            &self.register,
            &self.school,
            &self.year,
            self.config.absence_threshold,
            self.config.note_threshold,
        )?;
        tracing::info!(actor = %session.username, flagged = flagged.len(), "students monitored");
        Ok(flagged)
    }

    pub fn import_roster(&mut self, session: &Session, rows: &[RosterRow]) -> ServiceResult<ImportSummary> {
        self.guard(session, &[Role::Administrator], "import a roster")?;
        let result = self.school.import_roster(rows, &self.year);
        let summary = self.rejected("import_roster", session, result)?;

        self.record("roster_imported", "school", &self.year.to_string(), json!(summary), session);
        tracing::info!(
            actor = %session.username,
            students = summary.students_added,
            classes = summary.classes_created,
            "roster imported"
        );
        Ok(summary)
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn link_mut(&mut self) -> &mut ServerLink {
        &mut self.link
    }

    pub fn school_year(&self) -> AcademicYear {
        self.year
    }

    pub fn config(&self) -> &SmosConfig {
        &self.config
    }

    /// Current class of a student, if enrolled
    pub fn class_of(&self, student_id: &str) -> ServiceResult<Option<SchoolClass>> {
        match self.school.get_student(student_id)?.class_id {
            Some(class_id) => Ok(Some(self.school.get_class(&class_id)?)),
            None => Ok(None),
        }
    }
}
