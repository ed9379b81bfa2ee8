// 🍽️ Refreshment Point entity
//
// A bar/restaurant registered with eTour. Agency operators create, edit and
// delete points; tourists search them and view their card.

use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationResult};
use serde::{Deserialize, Serialize};

pub const MAX_MENU_ITEMS: usize = 50;

// ============================================================================
// ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshmentPoint {
    /// Stable identity (UUID)
    pub id: String,

    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,

    /// Seats available
    pub capacity: u32,

    /// Items on offer ("Espresso", "Gelato", ...)
    pub menu: Vec<String>,

    /// Username of the operator who registered the point
    pub operator: String,

    pub meta: VersionMeta,
}

impl Versioned for RefreshmentPoint {
    const ENTITY: &'static str = "RefreshmentPoint";

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

/// The editable fields of a point, as submitted from a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshmentPointDraft {
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub capacity: u32,
    #[serde(default)]
    pub menu: Vec<String>,
}

impl RefreshmentPointDraft {
    pub fn validate(&self) -> ValidationResult {
        let mut lowered: Vec<String> = self.menu.iter().map(|m| m.trim().to_lowercase()).collect();
        lowered.sort();
        let before = lowered.len();
        lowered.dedup();
        let has_duplicates = lowered.len() != before;

        let mut checks = FieldChecks::new("RefreshmentPoint")
            .length("name", &self.name, 2, 60)
            .non_empty("address", &self.address)
            .non_empty("city", &self.city)
            .phone("phone", &self.phone)
            .range("capacity", self.capacity, 1, 1000)
            .custom(
                "menu",
                self.menu.len() <= MAX_MENU_ITEMS,
                &format!("At most {} menu items are allowed", MAX_MENU_ITEMS),
            )
            .custom("menu", !has_duplicates, "Menu items must be unique");

        for item in &self.menu {
            checks = checks.length("menu", item, 1, 60);
        }

        checks.finish()
    }

    fn apply_to(&self, point: &mut RefreshmentPoint) {
        point.name = self.name.trim().to_string();
        point.address = self.address.trim().to_string();
        point.city = self.city.trim().to_string();
        point.phone = self.phone.trim().to_string();
        point.capacity = self.capacity;
        point.menu = self.menu.iter().map(|m| m.trim().to_string()).collect();
    }
}

impl RefreshmentPoint {
    pub fn new(draft: &RefreshmentPointDraft, operator: &str) -> Self {
        let mut point = RefreshmentPoint {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            address: String::new(),
            city: String::new(),
            phone: String::new(),
            capacity: 0,
            menu: Vec::new(),
            operator: operator.to_string(),
            meta: VersionMeta::new(),
        };
        draft.apply_to(&mut point);
        point
    }

    pub fn to_draft(&self) -> RefreshmentPointDraft {
        RefreshmentPointDraft {
            name: self.name.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            phone: self.phone.clone(),
            capacity: self.capacity,
            menu: self.menu.clone(),
        }
    }

    /// Case-insensitive match on name or city
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.trim().to_lowercase();
        needle.is_empty()
            || self.name.to_lowercase().contains(&needle)
            || self.city.to_lowercase().contains(&needle)
    }

    /// Multi-line "card" shown to tourists
    pub fn card(&self) -> String {
        let menu = if self.menu.is_empty() {
            "(no menu published)".to_string()
        } else {
            self.menu.join(", ")
        };

        format!(
            "{}\n{} - {}\nPhone: {}\nSeats: {}\nMenu: {}",
            self.name, self.address, self.city, self.phone, self.capacity, menu
        )
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Clone, Default)]
pub struct RefreshmentPointRegistry {
    points: VersionedStore<RefreshmentPoint>,
}

impl RefreshmentPointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        draft: &RefreshmentPointDraft,
        operator: &str,
    ) -> ServiceResult<RefreshmentPoint> {
        draft.validate()?;
        self.ensure_unique(draft, None)?;
        self.points.insert(RefreshmentPoint::new(draft, operator))
    }

    /// One point per name and city, ignoring case; `except` is the point being edited
    fn ensure_unique(&self, draft: &RefreshmentPointDraft, except: Option<&str>) -> ServiceResult<()> {
        let name = draft.name.trim().to_lowercase();
        let city = draft.city.trim().to_lowercase();
        let clash = self.points.find(|p| {
            Some(p.id.as_str()) != except
                && p.name.to_lowercase() == name
                && p.city.to_lowercase() == city
        })?;
        if !clash.is_empty() {
            return Err(ServiceError::duplicate(
                "RefreshmentPoint",
                format!("{} in {}", draft.name.trim(), draft.city.trim()),
            ));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> ServiceResult<RefreshmentPoint> {
        self.points.get(id)
    }

    /// Replace the editable fields, keeping the old version in history
    pub fn modify(&self, id: &str, draft: &RefreshmentPointDraft) -> ServiceResult<RefreshmentPoint> {
        draft.validate()?;
        self.ensure_unique(draft, Some(id))?;
        self.points.update(id, |point| {
            draft.apply_to(point);
            Ok(())
        })
    }

    pub fn delete(&self, id: &str) -> ServiceResult<RefreshmentPoint> {
        self.points.retire(id)
    }

    pub fn search(&self, text: &str) -> ServiceResult<Vec<RefreshmentPoint>> {
        self.points.find(|p| p.matches(text))
    }

    pub fn all(&self) -> ServiceResult<Vec<RefreshmentPoint>> {
        self.points.all_current()
    }

    pub fn history(&self, id: &str) -> ServiceResult<Vec<RefreshmentPoint>> {
        self.points.history(id)
    }

    pub fn count(&self) -> ServiceResult<usize> {
        self.points.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, city: &str) -> RefreshmentPointDraft {
        RefreshmentPointDraft {
            name: name.to_string(),
            address: "Via del Corso 12".to_string(),
            city: city.to_string(),
            phone: "+39 06 1234567".to_string(),
            capacity: 40,
            menu: vec!["Espresso".to_string(), "Cornetto".to_string()],
        }
    }

    #[test]
    fn test_valid_draft() {
        assert!(draft("Bar Roma", "Rome").validate().is_ok());
    }

    #[test]
    fn test_invalid_draft_reports_each_field() {
        let mut bad = draft("X", "");
        bad.phone = "abc".to_string();
        bad.capacity = 0;

        let errors = bad.validate().unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "city", "phone", "capacity"]);
    }

    #[test]
    fn test_duplicate_menu_items_rejected() {
        let mut bad = draft("Bar Roma", "Rome");
        bad.menu = vec!["Espresso".to_string(), " espresso ".to_string()];
        let errors = bad.validate().unwrap_err();
        assert_eq!(errors[0].message, "Menu items must be unique");
    }

    #[test]
    fn test_register_and_modify() {
        let registry = RefreshmentPointRegistry::new();
        let point = registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();
        assert_eq!(point.operator, "agency");

        let mut changed = point.to_draft();
        changed.capacity = 80;
        changed.menu.push("Gelato".to_string());

        let updated = registry.modify(&point.id, &changed).unwrap();
        assert_eq!(updated.capacity, 80);
        assert_eq!(updated.menu.len(), 3);
        assert_eq!(updated.meta.version, 2);
        assert_eq!(registry.history(&point.id).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_modify_keeps_old_values() {
        let registry = RefreshmentPointRegistry::new();
        let point = registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();

        let mut bad = point.to_draft();
        bad.capacity = 5000;
        assert_eq!(registry.modify(&point.id, &bad).unwrap_err().kind(), "validation");
        assert_eq!(registry.get(&point.id).unwrap().capacity, 40);
    }

    #[test]
    fn test_same_name_same_city_is_duplicate() {
        let registry = RefreshmentPointRegistry::new();
        registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();

        let err = registry.register(&draft("bar roma", "ROME"), "agency").unwrap_err();
        assert_eq!(err.kind(), "duplicate");

        // Same name elsewhere is fine
        assert!(registry.register(&draft("Bar Roma", "Milan"), "agency").is_ok());
    }

    #[test]
    fn test_modify_into_existing_name_is_duplicate() {
        let registry = RefreshmentPointRegistry::new();
        registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();
        let other = registry.register(&draft("Bar Milano", "Rome"), "agency").unwrap();

        let mut renamed = other.to_draft();
        renamed.name = "BAR ROMA".to_string();
        assert_eq!(registry.modify(&other.id, &renamed).unwrap_err().kind(), "duplicate");
        assert_eq!(registry.get(&other.id).unwrap().name, "Bar Milano");

        // Editing a point without renaming it does not clash with itself
        let mut same = other.to_draft();
        same.capacity = 60;
        assert_eq!(registry.modify(&other.id, &same).unwrap().capacity, 60);
    }

    #[test]
    fn test_search_by_name_or_city() {
        let registry = RefreshmentPointRegistry::new();
        registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();
        registry.register(&draft("Trattoria Da Enzo", "Rome"), "agency").unwrap();
        registry.register(&draft("Caffè Napoli", "Naples"), "agency").unwrap();

        assert_eq!(registry.search("rome").unwrap().len(), 2);
        assert_eq!(registry.search("NAPOLI").unwrap().len(), 1);
        assert_eq!(registry.search("").unwrap().len(), 3);
        assert!(registry.search("Paris").unwrap().is_empty());
    }

    #[test]
    fn test_delete_hides_point() {
        let registry = RefreshmentPointRegistry::new();
        let point = registry.register(&draft("Bar Roma", "Rome"), "agency").unwrap();

        registry.delete(&point.id).unwrap();
        assert_eq!(registry.count().unwrap(), 0);
        assert_eq!(registry.get(&point.id).unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_card_lists_menu() {
        let point = RefreshmentPoint::new(&draft("Bar Roma", "Rome"), "agency");
        let card = point.card();
        assert!(card.starts_with("Bar Roma\n"));
        assert!(card.contains("Menu: Espresso, Cornetto"));
    }
}
