// 🎬 Narrated use cases
//
// Each scenario builds the sample eTour or SMOS system, walks one use case
// and keeps a transcript of the steps. The CLI prints transcripts; tests
// assert on them.

use crate::config::AppConfig;
use crate::db::{AuditTrail, Event};
use crate::error::{ServiceError, ServiceResult};
use crate::etour::{
    DestinationType, Etour, ImageDescriptor, ModifyOutcome, RefreshmentPoint, SAMPLE_OPERATOR,
    SAMPLE_TOURIST,
};
use crate::smos::{sample, DelayEntry, Outbox, Role, Semester, Smos};
use chrono::{Duration, NaiveTime};
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    InsertBanner,
    ModifyBanner,
    DeleteBanner,
    ModifyRefreshmentPoint,
    SearchRefreshmentPoints,
    ModifySearchPreferences,
    RemoveBookmark,
    AssignRoles,
    EnterAbsences,
    InsertJustification,
    ViewReportCard,
    MonitorStudents,
    AcceptEnrollment,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        &[
            Scenario::InsertBanner,
            Scenario::ModifyBanner,
            Scenario::DeleteBanner,
            Scenario::ModifyRefreshmentPoint,
            Scenario::SearchRefreshmentPoints,
            Scenario::ModifySearchPreferences,
            Scenario::RemoveBookmark,
            Scenario::AssignRoles,
            Scenario::EnterAbsences,
            Scenario::InsertJustification,
            Scenario::ViewReportCard,
            Scenario::MonitorStudents,
            Scenario::AcceptEnrollment,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::InsertBanner => "insert-banner",
            Scenario::ModifyBanner => "modify-banner",
            Scenario::DeleteBanner => "delete-banner",
            Scenario::ModifyRefreshmentPoint => "modify-refreshment-point",
            Scenario::SearchRefreshmentPoints => "search-refreshment-points",
            Scenario::ModifySearchPreferences => "modify-search-preferences",
            Scenario::RemoveBookmark => "remove-bookmark",
            Scenario::AssignRoles => "assign-roles",
            Scenario::EnterAbsences => "enter-absences",
            Scenario::InsertJustification => "insert-justification",
            Scenario::ViewReportCard => "view-report-card",
            Scenario::MonitorStudents => "monitor-students",
            Scenario::AcceptEnrollment => "accept-enrollment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::InsertBanner => "eTour operator uploads a banner for a refreshment point",
            Scenario::ModifyBanner => "eTour operator replaces a banner image",
            Scenario::DeleteBanner => "eTour operator removes a banner",
            Scenario::ModifyRefreshmentPoint => "eTour operator updates a refreshment point's data",
            Scenario::SearchRefreshmentPoints => "Tourist looks up refreshment points in a city",
            Scenario::ModifySearchPreferences => "Tourist changes their search preferences",
            Scenario::RemoveBookmark => "Tourist removes a bookmarked site",
            Scenario::AssignRoles => "SMOS administrator gives a user the teacher role",
            Scenario::EnterAbsences => "SMOS administrator fills in today's class register",
            Scenario::InsertJustification => "SMOS administrator justifies an absence",
            Scenario::ViewReportCard => "Parent reads their child's report card",
            Scenario::MonitorStudents => "SMOS administrator lists students over the thresholds",
            Scenario::AcceptEnrollment => "SMOS administrator accepts a pending enrollment",
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Scenario::all()
            .iter()
            .copied()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| format!("Unknown scenario: {} (see `scenarios`)", s.trim()))
    }
}

// ============================================================================
// TRANSCRIPT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub scenario: Scenario,
    pub lines: Vec<String>,
    pub succeeded: bool,

    /// Audit events recorded during the run
    pub events: Vec<Event>,
}

impl Transcript {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

struct Narration {
    lines: Vec<String>,
    audit: AuditTrail,
}

impl Narration {
    fn new() -> Self {
        Narration {
            lines: Vec::new(),
            audit: AuditTrail::new(),
        }
    }

    /// Follow the audit trail of the system under test
    fn watch(&mut self, audit: &AuditTrail) {
        self.audit = audit.clone();
    }

    fn login(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("🔐 {}", text.as_ref()));
    }

    fn step(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("📝 {}", text.as_ref()));
    }

    fn detail(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("   {}", text.as_ref()));
    }

    fn done(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("✓ {}", text.as_ref()));
    }

    fn failed(&mut self, err: &ServiceError) {
        match err {
            ServiceError::ConnectionInterrupted { server } => {
                self.lines
                    .push(format!("❌ Connection to the {} server was interrupted", server));
            }
            other => {
                for (index, line) in other.to_string().lines().enumerate() {
                    if index == 0 {
                        self.lines.push(format!("❌ {}", line));
                    } else {
                        self.lines.push(format!("   {}", line));
                    }
                }
            }
        }
    }
}

/// Walk one use case against freshly seeded sample data
pub fn run(scenario: Scenario, config: &AppConfig) -> Transcript {
    let mut narration = Narration::new();

    let result = match scenario {
        Scenario::InsertBanner => insert_banner(&mut narration, config),
        Scenario::ModifyBanner => modify_banner(&mut narration, config),
        Scenario::DeleteBanner => delete_banner(&mut narration, config),
        Scenario::ModifyRefreshmentPoint => modify_refreshment_point(&mut narration, config),
        Scenario::SearchRefreshmentPoints => search_refreshment_points(&mut narration, config),
        Scenario::ModifySearchPreferences => modify_search_preferences(&mut narration, config),
        Scenario::RemoveBookmark => remove_bookmark(&mut narration, config),
        Scenario::AssignRoles => assign_roles(&mut narration, config),
        Scenario::EnterAbsences => enter_absences(&mut narration, config),
        Scenario::InsertJustification => insert_justification(&mut narration, config),
        Scenario::ViewReportCard => view_report_card(&mut narration, config),
        Scenario::MonitorStudents => monitor_students(&mut narration, config),
        Scenario::AcceptEnrollment => accept_enrollment(&mut narration, config),
    };

    let succeeded = match result {
        Ok(()) => true,
        Err(err) => {
            narration.failed(&err);
            tracing::warn!(scenario = scenario.name(), kind = err.kind(), "scenario did not complete");
            false
        }
    };

    Transcript {
        scenario,
        lines: narration.lines,
        succeeded,
        events: narration.audit.events(),
    }
}

// ============================================================================
// eTour
// ============================================================================

fn etour(narration: &mut Narration, config: &AppConfig) -> ServiceResult<Etour> {
    let etour = Etour::with_sample_data(config)?;
    narration.watch(etour.audit());
    Ok(etour)
}

fn find_point(etour: &mut Etour, name: &str) -> ServiceResult<RefreshmentPoint> {
    etour
        .search_refreshment_points(name)?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("RefreshmentPoint", name))
}

fn insert_banner(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Operator {} logged in to eTour", SAMPLE_OPERATOR));

    let point = find_point(&mut etour, "Trattoria")?;
    n.step(format!("Selected refreshment point {}", point.name));

    let image = ImageDescriptor::new("banners/enzo-carbonara.jpg", 350_000, 1024, 400);
    n.step(format!(
        "Uploading {} ({}x{}, {} KB)",
        image.file_name(),
        image.width,
        image.height,
        image.size_bytes / 1000
    ));
    let banner = etour.insert_banner(SAMPLE_OPERATOR, &point.id, image)?;

    let count = etour.banners_for_point(&point.id)?.len();
    n.done(format!(
        "Banner {} inserted ({} of {} for this point)",
        banner.image.file_name(),
        count,
        etour.config().max_banners_per_point
    ));
    Ok(())
}

fn modify_banner(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Operator {} logged in to eTour", SAMPLE_OPERATOR));

    let point = find_point(&mut etour, "Bar Roma")?;
    let banner = etour
        .banners_for_point(&point.id)?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::not_found("Banner", &point.name))?;
    n.step(format!("Replacing {} on {}", banner.image.file_name(), point.name));

    let image = ImageDescriptor::new("banners/bar-roma-autumn.png", 480_000, 1200, 400);
    let banner = etour.modify_banner(SAMPLE_OPERATOR, &banner.id, image)?;
    n.done(format!(
        "Banner now shows {} (version {})",
        banner.image.file_name(),
        banner.meta.version
    ));
    Ok(())
}

fn delete_banner(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Operator {} logged in to eTour", SAMPLE_OPERATOR));

    let point = find_point(&mut etour, "Bar Roma")?;
    let banners = etour.banners_for_point(&point.id)?;
    n.step(format!("{} has {} banners", point.name, banners.len()));

    let banner = banners
        .into_iter()
        .last()
        .ok_or_else(|| ServiceError::not_found("Banner", &point.name))?;
    n.step(format!("Deleting {}", banner.image.file_name()));
    etour.delete_banner(SAMPLE_OPERATOR, &banner.id)?;

    let left = etour.banners_for_point(&point.id)?.len();
    n.done(format!("Banner deleted, {} left", left));
    Ok(())
}

fn modify_refreshment_point(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Operator {} logged in to eTour", SAMPLE_OPERATOR));

    let point = find_point(&mut etour, "Gambrinus")?;
    let point = etour.view_refreshment_point(&point.id)?;
    n.step(format!("Editing {}", point.name));
    for line in point.card().lines() {
        n.detail(line);
    }

    let mut draft = point.to_draft();
    draft.phone = "+39 081 417 5820".to_string();
    draft.menu.push("Caffè sospeso".to_string());
    let updated = etour.modify_refreshment_point(SAMPLE_OPERATOR, &point.id, &draft)?;

    n.done(format!(
        "{} saved (version {}, {} menu items)",
        updated.name,
        updated.meta.version,
        updated.menu.len()
    ));
    Ok(())
}

fn search_refreshment_points(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Tourist {} opened eTour", SAMPLE_TOURIST));

    n.step("Searching refreshment points in \"rome\"");
    let found = etour.search_refreshment_points("rome")?;
    for point in &found {
        n.detail(format!("• {}, {} ({})", point.name, point.address, point.city));
    }
    n.done(format!("{} refreshment points found", found.len()));
    Ok(())
}

fn modify_search_preferences(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Tourist {} opened eTour", SAMPLE_TOURIST));

    let mut prefs = etour.search_preferences(SAMPLE_TOURIST)?;
    n.step(format!(
        "Current preferences: {:?}, budget {}, within {} km",
        prefs.destination, prefs.max_budget, prefs.max_distance_km
    ));

    prefs.destination = DestinationType::Beach;
    prefs.max_budget = 1500;
    prefs.family_friendly = true;
    n.step("Submitting: Beach, budget 1500, family friendly");

    match etour.modify_search_preferences(SAMPLE_TOURIST, prefs)? {
        ModifyOutcome::Saved => n.done("Search preferences saved"),
        ModifyOutcome::Unchanged => n.done("Nothing changed"),
    }
    Ok(())
}

fn remove_bookmark(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let mut etour = etour(n, config)?;
    n.login(format!("Tourist {} opened eTour", SAMPLE_TOURIST));

    let sites = etour.bookmarked_sites(SAMPLE_TOURIST)?;
    n.step(format!("{} bookmarked sites", sites.len()));
    for site in &sites {
        n.detail(format!("• {} ({})", site.name, site.location));
    }

    let removed = etour.remove_bookmarked_site(SAMPLE_TOURIST, "site-pantheon")?;
    let left = etour.bookmarked_sites(SAMPLE_TOURIST)?.len();
    n.done(format!("{} removed, {} bookmarks left", removed.name, left));
    Ok(())
}

// ============================================================================
// SMOS
// ============================================================================

fn smos(n: &mut Narration, config: &AppConfig) -> ServiceResult<(Smos, Outbox)> {
    let outbox = Outbox::new();
    let smos = Smos::with_sample_data_using(config, Box::new(outbox.clone()))?;
    n.watch(smos.audit());
    Ok((smos, outbox))
}

fn assign_roles(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, _) = smos(n, config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    n.login(format!("{} logged in to SMOS", admin.username));

    let user = smos.find_user(sample::NEWCOMER.0)?;
    n.step(format!("Giving {} the teacher role", user.full_name()));
    let change = smos.update_roles(&admin, &user.id, &[Role::Teacher], &[])?;

    let roles: Vec<&str> = change.roles.iter().map(Role::as_str).collect();
    n.done(format!("{} now has roles: {}", user.full_name(), roles.join(", ")));
    smos.logout(&admin);
    Ok(())
}

fn enter_absences(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, outbox) = smos(n, config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    n.login(format!("{} logged in to SMOS", admin.username));

    let class = smos
        .class_of(sample::STUDENT_ID)?
        .ok_or_else(|| ServiceError::not_found("Class", sample::STUDENT_ID))?;
    let today = smos.today();
    n.step(format!("Register of class {} for {}", class.name, today));

    let late_at = NaiveTime::from_hms_opt(8, 25, 0)
        .ok_or_else(|| ServiceError::InvalidState("invalid entry time".to_string()))?;
    n.detail(format!("absent: {}", sample::STUDENT_ID));
    n.detail(format!("late: {} at {}", sample::FLAGGED_STUDENT_ID, late_at.format("%H:%M")));

    let record = smos.record_register_day(
        &admin,
        &class.id,
        today,
        &[sample::STUDENT_ID.to_string()],
        &[DelayEntry::new(sample::FLAGGED_STUDENT_ID, late_at)],
    )?;

    n.done(format!(
        "{} absences and {} delays saved, {} parents notified",
        record.absences.len(),
        record.delays.len(),
        outbox.count()
    ));
    Ok(())
}

fn insert_justification(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, _) = smos(n, config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    n.login(format!("{} logged in to SMOS", admin.username));

    let absence = smos
        .absences_for_student(&admin, sample::STUDENT_ID)?
        .into_iter()
        .find(|a| !a.is_justified())
        .ok_or_else(|| ServiceError::not_found("Absence", sample::STUDENT_ID))?;
    n.step(format!("Justifying the absence of {} on {}", sample::STUDENT_ID, absence.date));

    let justification = smos.insert_justification(
        &admin,
        &absence.id,
        "Dentist appointment",
        absence.date + Duration::days(1),
    )?;
    let summary = smos.absence_summary(&admin, sample::STUDENT_ID)?;

    n.done(format!("Justification saved: {}", justification.reason));
    n.detail(format!(
        "{} absences: {} justified, {} unjustified",
        summary.total(),
        summary.justified,
        summary.unjustified
    ));
    Ok(())
}

fn view_report_card(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, _) = smos(n, config)?;
    let parent = smos.login(sample::PARENT.0, sample::PARENT.1)?;
    n.login(format!("{} logged in to SMOS", parent.username));

    let year = smos.school_year();
    let student = smos.student(&parent, sample::STUDENT_ID)?;
    n.step(format!("Report card of {}, {} semester {}", student.full_name(), Semester::First, year));

    let card = smos.view_report_card(&parent, &student.id, year, Semester::First)?;
    for grade in card.grades.values() {
        n.detail(format!("{}: {} ({:?})", grade.subject, grade.score, grade.letter));
    }
    if !card.comment.is_empty() {
        n.detail(format!("Comment: {}", card.comment));
    }

    match card.average() {
        Some(average) => n.done(format!("Average {:.1}", average)),
        None => n.done("No grades yet"),
    }
    Ok(())
}

fn monitor_students(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, _) = smos(n, config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    n.login(format!("{} logged in to SMOS", admin.username));

    let thresholds = smos.config().clone();
    n.step(format!(
        "Students with more than {} absences and more than {} notes in {}",
        thresholds.absence_threshold,
        thresholds.note_threshold,
        smos.school_year()
    ));

    let flagged = smos.monitor_students(&admin)?;
    for load in &flagged {
        n.detail(format!(
            "• {} ({}): {} absences, {} notes",
            load.full_name, load.student_id, load.absences, load.notes
        ));
    }
    n.done(format!("{} students to follow up", flagged.len()));
    Ok(())
}

fn accept_enrollment(n: &mut Narration, config: &AppConfig) -> ServiceResult<()> {
    let (mut smos, _) = smos(n, config)?;
    let admin = smos.login(sample::ADMIN.0, sample::ADMIN.1)?;
    n.login(format!("{} logged in to SMOS", admin.username));

    let pending = smos.pending_enrollments(&admin)?;
    n.step(format!("{} pending enrollment requests", pending.len()));

    let request = pending
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidState("No pending enrollment requests".to_string()))?;
    let student = smos.accept_enrollment(&admin, &request.id)?;
    let class = smos
        .class_of(&student.id)?
        .ok_or_else(|| ServiceError::not_found("Class", &request.class_id))?;

    n.done(format!("{} enrolled in class {}", student.full_name(), class.name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkConfig;

    #[test]
    fn test_every_scenario_succeeds_on_a_reliable_link() {
        let config = AppConfig::reliable();
        for scenario in Scenario::all() {
            let transcript = run(*scenario, &config);
            assert!(transcript.succeeded, "{} failed:\n{}", scenario, transcript.text());
            assert!(transcript.lines.iter().any(|l| l.starts_with("✓ ")));
        }
    }

    #[test]
    fn test_names_round_trip() {
        for scenario in Scenario::all() {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), *scenario);
        }
        assert_eq!("Enter_Absences".parse::<Scenario>().unwrap(), Scenario::EnterAbsences);
        assert!("launch-rocket".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_offline_link_fails_with_server_name() {
        let mut config = AppConfig::reliable();
        config.link = LinkConfig {
            failure_rate: 1.0,
            ..LinkConfig::default()
        };

        let transcript = run(Scenario::InsertBanner, &config);
        assert!(!transcript.succeeded);
        assert_eq!(
            transcript.lines.last().map(String::as_str),
            Some("❌ Connection to the ETOUR server was interrupted")
        );
        assert!(transcript.events.is_empty());

        let transcript = run(Scenario::AssignRoles, &config);
        assert_eq!(
            transcript.lines.last().map(String::as_str),
            Some("❌ Connection to the SMOS server was interrupted")
        );
    }

    #[test]
    fn test_transcript_carries_audit_events() {
        let transcript = run(Scenario::EnterAbsences, &AppConfig::reliable());
        let types: Vec<&str> = transcript.events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["user_logged_in", "register_day_recorded"]);
        assert!(transcript.text().contains("1 parents notified"));
    }

    #[test]
    fn test_register_scenario_uses_the_school_calendar() {
        let first = run(Scenario::EnterAbsences, &AppConfig::reliable());
        let second = run(Scenario::EnterAbsences, &AppConfig::reliable());

        assert_eq!(first.lines, second.lines);
        assert!(first.text().contains("Register of class 3A for 2023-11-30"));
    }

    #[test]
    fn test_monitoring_transcript_names_flagged_student() {
        let transcript = run(Scenario::MonitorStudents, &AppConfig::reliable());
        assert!(transcript.succeeded);
        assert!(transcript.text().contains("Emma Johnson (S002): 7 absences, 4 notes"));
        assert!(transcript.text().contains("1 students to follow up"));
    }
}
