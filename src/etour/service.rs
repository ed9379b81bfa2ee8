// 🏖️ eTour service facade
//
// Every operation follows the same steps:
// 1. ask the ETOUR server link (may be interrupted)
// 2. validate the input
// 3. mutate the in-memory registries
// 4. record an audit event and log

use super::banner::{Banner, BannerRegistry, ImageDescriptor, ImageRules};
use super::preferences::{ModifyOutcome, PreferenceBook, SearchPreferences, Site};
use super::refreshment::{RefreshmentPoint, RefreshmentPointDraft, RefreshmentPointRegistry};
use crate::config::{AppConfig, EtourConfig};
use crate::db::{AuditTrail, Event};
use crate::error::{ServiceError, ServiceResult};
use crate::link::ServerLink;
use serde_json::json;

pub const ETOUR_SERVER: &str = "ETOUR";

/// Tourist seeded by [`Etour::with_sample_data`]
pub const SAMPLE_TOURIST: &str = "tourist01";

/// Agency operator seeded by [`Etour::with_sample_data`]
pub const SAMPLE_OPERATOR: &str = "agency.operator";

pub struct Etour {
    points: RefreshmentPointRegistry,
    banners: BannerRegistry,
    preferences: PreferenceBook,
    rules: ImageRules,
    config: EtourConfig,
    link: ServerLink,
    audit: AuditTrail,
}

impl Etour {
    pub fn new(config: EtourConfig, link: ServerLink, audit: AuditTrail) -> Self {
        Etour {
            points: RefreshmentPointRegistry::new(),
            banners: BannerRegistry::new(),
            preferences: PreferenceBook::new(),
            rules: ImageRules::from_config(&config),
            config,
            link,
            audit,
        }
    }

    /// A few points, banners and bookmarks to browse and run scenarios against.
    ///
    /// Seeding bypasses the link and the audit trail; the link configured in
    /// `config` applies from the first call after this returns.
    pub fn with_sample_data(config: &AppConfig) -> ServiceResult<Self> {
        let etour = Etour::new(
            config.etour.clone(),
            ServerLink::from_config(ETOUR_SERVER, &config.link),
            AuditTrail::new(),
        );
        etour.seed()
    }

    fn seed(mut self) -> ServiceResult<Self> {
        let samples = [
            ("Bar Roma", "Via del Corso 12", "Rome", "+39 06 6791234", 40, vec!["Espresso", "Cornetto", "Tramezzino"]),
            ("Trattoria Da Enzo", "Via dei Vascellari 29", "Rome", "+39 06 5812260", 35, vec!["Carbonara", "Cacio e pepe"]),
            ("Caffè Gambrinus", "Via Chiaia 1", "Naples", "+39 081 417582", 120, vec!["Sfogliatella", "Babà", "Espresso"]),
            ("Rifugio Lagazuoi", "Passo Falzarego", "Cortina d'Ampezzo", "+39 0436 867303", 74, vec!["Canederli", "Strudel"]),
        ];

        let mut first_point = None;
        for (name, address, city, phone, capacity, menu) in samples {
            let draft = RefreshmentPointDraft {
                name: name.to_string(),
                address: address.to_string(),
                city: city.to_string(),
                phone: phone.to_string(),
                capacity,
                menu: menu.into_iter().map(String::from).collect(),
            };
            let point = self.points.register(&draft, SAMPLE_OPERATOR)?;
            first_point.get_or_insert(point.id);
        }

        if let Some(point_id) = first_point {
            for (path, size, width, height) in [
                ("banners/bar-roma-summer.png", 420_000, 1200, 400),
                ("banners/bar-roma-aperitivo.jpg", 310_000, 800, 300),
            ] {
                self.banners.insert(
                    &point_id,
                    ImageDescriptor::new(path, size, width, height),
                    SAMPLE_OPERATOR,
                    &self.rules,
                    self.config.max_banners_per_point,
                )?;
            }
        }

        for site in [
            Site::new("site-colosseum", "Colosseum", "Rome"),
            Site::new("site-pantheon", "Pantheon", "Rome"),
            Site::new("site-pompeii", "Pompeii", "Naples"),
        ] {
            self.preferences.bookmark(SAMPLE_TOURIST, site)?;
        }

        Ok(self)
    }

    fn record(&self, event_type: &str, entity_type: &str, entity_id: &str, data: serde_json::Value, actor: &str) {
        self.audit
            .record(Event::new(event_type, entity_type, entity_id, data, actor));
    }

    fn rejected<T>(&self, operation: &str, actor: &str, result: ServiceResult<T>) -> ServiceResult<T> {
        if let Err(err) = &result {
            if !err.is_connection_interrupted() {
                tracing::warn!(operation, actor, kind = err.kind(), "eTour request rejected");
            }
        }
        result
    }

    // ========================================================================
    // REFRESHMENT POINTS
    // ========================================================================

    pub fn insert_refreshment_point(
        &mut self,
        operator: &str,
        draft: &RefreshmentPointDraft,
    ) -> ServiceResult<RefreshmentPoint> {
        self.link.check()?;
        let result = self.points.register(draft, operator);
        let point = self.rejected("insert_refreshment_point", operator, result)?;

        self.record(
            "refreshment_point_inserted",
            "refreshment_point",
            &point.id,
            json!({ "name": point.name, "city": point.city }),
            operator,
        );
        tracing::info!(actor = operator, id = %point.id, name = %point.name, "refreshment point inserted");
        Ok(point)
    }

    pub fn view_refreshment_point(&mut self, id: &str) -> ServiceResult<RefreshmentPoint> {
        self.link.check()?;
        self.points.get(id)
    }

    pub fn modify_refreshment_point(
        &mut self,
        operator: &str,
        id: &str,
        draft: &RefreshmentPointDraft,
    ) -> ServiceResult<RefreshmentPoint> {
        self.link.check()?;
        let result = self.points.modify(id, draft);
        let point = self.rejected("modify_refreshment_point", operator, result)?;

        self.record(
            "refreshment_point_modified",
            "refreshment_point",
            &point.id,
            json!({ "version": point.meta.version, "draft": draft }),
            operator,
        );
        tracing::info!(actor = operator, id = %point.id, version = point.meta.version, "refreshment point modified");
        Ok(point)
    }

    /// Delete a point together with its banners
    pub fn delete_refreshment_point(&mut self, operator: &str, id: &str) -> ServiceResult<RefreshmentPoint> {
        self.link.check()?;
        // Banners go first so a failed cascade leaves the point in place
        let result = self
            .points
            .get(id)
            .and_then(|_| self.banners.remove_for_point(id))
            .and_then(|removed| self.points.delete(id).map(|point| (point, removed)));
        let (point, banners_removed) = self.rejected("delete_refreshment_point", operator, result)?;

        self.record(
            "refreshment_point_deleted",
            "refreshment_point",
            id,
            json!({ "name": point.name, "banners_removed": banners_removed }),
            operator,
        );
        tracing::info!(actor = operator, id, banners_removed, "refreshment point deleted");
        Ok(point)
    }

    pub fn search_refreshment_points(&mut self, text: &str) -> ServiceResult<Vec<RefreshmentPoint>> {
        self.link.check()?;
        self.points.search(text)
    }

    // ========================================================================
    // BANNERS
    // ========================================================================

    pub fn insert_banner(
        &mut self,
        operator: &str,
        point_id: &str,
        image: ImageDescriptor,
    ) -> ServiceResult<Banner> {
        self.link.check()?;
        let result = self.points.get(point_id).and_then(|_| {
            self.banners.insert(
                point_id,
                image,
                operator,
                &self.rules,
                self.config.max_banners_per_point,
            )
        });
        let banner = self.rejected("insert_banner", operator, result)?;

        self.record(
            "banner_inserted",
            "banner",
            &banner.id,
            json!({ "point_id": point_id, "image": banner.image.path }),
            operator,
        );
        tracing::info!(actor = operator, id = %banner.id, point_id, "banner inserted");
        Ok(banner)
    }

    pub fn modify_banner(
        &mut self,
        operator: &str,
        banner_id: &str,
        image: ImageDescriptor,
    ) -> ServiceResult<Banner> {
        self.link.check()?;
        let result = self.banners.modify_image(banner_id, image, &self.rules);
        let banner = self.rejected("modify_banner", operator, result)?;

        self.record(
            "banner_modified",
            "banner",
            banner_id,
            json!({ "image": banner.image.path, "version": banner.meta.version }),
            operator,
        );
        tracing::info!(actor = operator, id = banner_id, "banner modified");
        Ok(banner)
    }

    pub fn delete_banner(&mut self, operator: &str, banner_id: &str) -> ServiceResult<Banner> {
        self.link.check()?;
        let result = self.banners.delete(banner_id);
        let banner = self.rejected("delete_banner", operator, result)?;

        self.record(
            "banner_deleted",
            "banner",
            banner_id,
            json!({ "point_id": banner.point_id }),
            operator,
        );
        tracing::info!(actor = operator, id = banner_id, "banner deleted");
        Ok(banner)
    }

    pub fn banners_for_point(&mut self, point_id: &str) -> ServiceResult<Vec<Banner>> {
        self.link.check()?;
        self.points.get(point_id)?;
        self.banners.for_point(point_id)
    }

    // ========================================================================
    // SEARCH PREFERENCES & BOOKMARKS
    // ========================================================================

    pub fn search_preferences(&mut self, tourist_id: &str) -> ServiceResult<SearchPreferences> {
        self.link.check()?;
        Ok(self.preferences.preferences(tourist_id))
    }

    pub fn modify_search_preferences(
        &mut self,
        tourist_id: &str,
        prefs: SearchPreferences,
    ) -> ServiceResult<ModifyOutcome> {
        self.link.check()?;
        let result = self.preferences.modify(tourist_id, prefs.clone());
        let outcome = self.rejected("modify_search_preferences", tourist_id, result)?;

        if outcome == ModifyOutcome::Saved {
            self.record(
                "search_preferences_modified",
                "search_preferences",
                tourist_id,
                json!(prefs),
                tourist_id,
            );
        }
        tracing::info!(actor = tourist_id, outcome = ?outcome, "search preferences submitted");
        Ok(outcome)
    }

    pub fn reset_search_preferences(&mut self, tourist_id: &str) -> ServiceResult<SearchPreferences> {
        self.link.check()?;
        let prefs = self.preferences.reset(tourist_id);

        self.record("search_preferences_reset", "search_preferences", tourist_id, json!({}), tourist_id);
        tracing::info!(actor = tourist_id, "search preferences reset");
        Ok(prefs)
    }

    pub fn bookmark_site(&mut self, tourist_id: &str, site: Site) -> ServiceResult<()> {
        self.link.check()?;
        let site_id = site.id.clone();
        let result = self.preferences.bookmark(tourist_id, site);
        self.rejected("bookmark_site", tourist_id, result)?;

        self.record("site_bookmarked", "bookmark", &site_id, json!({ "tourist": tourist_id }), tourist_id);
        tracing::info!(actor = tourist_id, site = %site_id, "site bookmarked");
        Ok(())
    }

    pub fn remove_bookmarked_site(&mut self, tourist_id: &str, site_id: &str) -> ServiceResult<Site> {
        self.link.check()?;
        let result = self.preferences.remove_bookmark(tourist_id, site_id);
        let site = self.rejected("remove_bookmarked_site", tourist_id, result)?;

        self.record("bookmark_removed", "bookmark", site_id, json!({ "tourist": tourist_id }), tourist_id);
        tracing::info!(actor = tourist_id, site = site_id, "bookmark removed");
        Ok(site)
    }

    pub fn bookmarked_sites(&mut self, tourist_id: &str) -> ServiceResult<Vec<Site>> {
        self.link.check()?;
        Ok(self.preferences.bookmarks(tourist_id))
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

    pub fn config(&self) -> &EtourConfig {
        &self.config
    }

    /// Point history, oldest version first (no link check, local data)
    pub fn refreshment_point_history(&self, id: &str) -> ServiceResult<Vec<RefreshmentPoint>> {
        let history = self.points.history(id)?;
        if history.is_empty() {
            return Err(ServiceError::not_found("RefreshmentPoint", id));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkMode;

    fn etour() -> Etour {
        Etour::with_sample_data(&AppConfig::reliable()).unwrap()
    }

    fn point_id(etour: &mut Etour, name: &str) -> String {
        etour.search_refreshment_points(name).unwrap()[0].id.clone()
    }

    fn image(path: &str) -> ImageDescriptor {
        ImageDescriptor::new(path, 150_000, 640, 320)
    }

    #[test]
    fn test_sample_data() {
        let mut etour = etour();
        assert_eq!(etour.search_refreshment_points("").unwrap().len(), 4);
        let bar = point_id(&mut etour, "Bar Roma");
        assert_eq!(etour.banners_for_point(&bar).unwrap().len(), 2);
        assert_eq!(etour.bookmarked_sites(SAMPLE_TOURIST).unwrap().len(), 3);
        assert!(etour.audit().is_empty());
    }

    #[test]
    fn test_insert_banner_records_event() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");

        let banner = etour.insert_banner("op", &bar, image("banners/new.png")).unwrap();
        let events = etour.audit().for_entity("banner", &banner.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "banner_inserted");
        assert_eq!(events[0].actor, "op");
    }

    #[test]
    fn test_insert_banner_up_to_limit() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");

        // Two seeded, default limit 5
        for i in 0..3 {
            etour
                .insert_banner("op", &bar, image(&format!("extra-{}.png", i)))
                .unwrap();
        }
        let err = etour.insert_banner("op", &bar, image("one-too-many.png")).unwrap_err();
        assert_eq!(err.to_string(), "Maximum number of banners reached (5)");
    }

    #[test]
    fn test_insert_banner_unknown_point() {
        let mut etour = etour();
        let err = etour.insert_banner("op", "missing", image("a.png")).unwrap_err();
        assert_eq!(err, ServiceError::not_found("RefreshmentPoint", "missing"));
        assert!(etour.audit().is_empty());
    }

    #[test]
    fn test_interrupted_connection_changes_nothing() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");
        etour.link_mut().set_mode(LinkMode::Offline);

        let err = etour.insert_banner("op", &bar, image("a.png")).unwrap_err();
        assert!(err.is_connection_interrupted());

        etour.link_mut().set_mode(LinkMode::Online);
        assert_eq!(etour.banners_for_point(&bar).unwrap().len(), 2);
        assert!(etour.audit().is_empty());
    }

    #[test]
    fn test_modify_refreshment_point() {
        let mut etour = etour();
        let id = point_id(&mut etour, "Trattoria");

        let mut draft = etour.view_refreshment_point(&id).unwrap().to_draft();
        draft.capacity = 50;
        let updated = etour.modify_refreshment_point("op", &id, &draft).unwrap();

        assert_eq!(updated.capacity, 50);
        assert_eq!(etour.refreshment_point_history(&id).unwrap().len(), 2);
        assert_eq!(etour.audit().len(), 1);
    }

    #[test]
    fn test_delete_point_cascades_to_banners() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");

        etour.delete_refreshment_point("op", &bar).unwrap();
        assert_eq!(etour.view_refreshment_point(&bar).unwrap_err().kind(), "not_found");
        assert_eq!(etour.banners_for_point(&bar).unwrap_err().kind(), "not_found");
        assert_eq!(etour.search_refreshment_points("").unwrap().len(), 3);

        let events = etour.audit().events();
        assert_eq!(events[0].data["banners_removed"], 2);
    }

    #[test]
    fn test_failed_cascade_keeps_point() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");
        etour.banners.poison();

        let err = etour.delete_refreshment_point("op", &bar).unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert_eq!(etour.view_refreshment_point(&bar).unwrap().name, "Bar Roma");
        assert!(etour.audit().is_empty());
    }

    #[test]
    fn test_modify_and_delete_banner() {
        let mut etour = etour();
        let bar = point_id(&mut etour, "Bar Roma");
        let banner = etour.banners_for_point(&bar).unwrap()[0].clone();

        let updated = etour.modify_banner("op", &banner.id, image("banners/winter.gif")).unwrap();
        assert_eq!(updated.image.path, "banners/winter.gif");

        etour.delete_banner("op", &banner.id).unwrap();
        assert_eq!(etour.banners_for_point(&bar).unwrap().len(), 1);
        assert_eq!(etour.delete_banner("op", &banner.id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_preferences_round() {
        let mut etour = etour();
        let mut prefs = etour.search_preferences(SAMPLE_TOURIST).unwrap();
        prefs.max_budget = 2500;

        assert_eq!(
            etour.modify_search_preferences(SAMPLE_TOURIST, prefs.clone()).unwrap(),
            ModifyOutcome::Saved
        );
        assert_eq!(
            etour.modify_search_preferences(SAMPLE_TOURIST, prefs).unwrap(),
            ModifyOutcome::Unchanged
        );
        // Only the saving submission is audited
        assert_eq!(etour.audit().len(), 1);

        let reset = etour.reset_search_preferences(SAMPLE_TOURIST).unwrap();
        assert_eq!(reset.max_budget, 1000);
    }

    #[test]
    fn test_bookmarks() {
        let mut etour = etour();
        let removed = etour.remove_bookmarked_site(SAMPLE_TOURIST, "site-pantheon").unwrap();
        assert_eq!(removed.name, "Pantheon");
        assert_eq!(etour.bookmarked_sites(SAMPLE_TOURIST).unwrap().len(), 2);

        etour
            .bookmark_site(SAMPLE_TOURIST, Site::new("site-pantheon", "Pantheon", "Rome"))
            .unwrap();
        assert_eq!(etour.bookmarked_sites(SAMPLE_TOURIST).unwrap().len(), 3);
    }
}
