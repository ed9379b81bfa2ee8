// 🧭 Tourist search preferences and bookmarked sites

use crate::error::{ServiceError, ServiceResult};
use crate::validation::{FieldChecks, ValidationResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationType {
    Beach,
    Mountain,
    City,
    Countryside,
    Historical,
    Island,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accommodation {
    Hotel,
    Hostel,
    BedAndBreakfast,
    Camping,
    Apartment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoodPreference {
    Any,
    Vegetarian,
    Vegan,
    NonVegetarian,
}

// ============================================================================
// SEARCH PREFERENCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPreferences {
    pub tourist_id: String,
    pub destination: DestinationType,

    /// Euros
    pub max_budget: u32,

    pub max_distance_km: u32,
    pub accommodation: Accommodation,
    pub family_friendly: bool,
    pub adventure: bool,
    pub food: FoodPreference,
}

impl SearchPreferences {
    pub fn defaults_for(tourist_id: &str) -> Self {
        SearchPreferences {
            tourist_id: tourist_id.to_string(),
            destination: DestinationType::City,
            max_budget: 1000,
            max_distance_km: 500,
            accommodation: Accommodation::Hotel,
            family_friendly: false,
            adventure: false,
            food: FoodPreference::Any,
        }
    }

    pub fn validate(&self) -> ValidationResult {
        FieldChecks::new("SearchPreferences")
            .non_empty("tourist_id", &self.tourist_id)
            .range("max_budget", self.max_budget, 100, 10_000)
            .range("max_distance_km", self.max_distance_km, 0, 2000)
            .finish()
    }
}

impl Default for SearchPreferences {
    fn default() -> Self {
        Self::defaults_for("")
    }
}

/// Result of saving preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModifyOutcome {
    Saved,

    /// Submitted values equal the stored ones
    Unchanged,
}

// ============================================================================
// SITES
// ============================================================================

/// A cultural site a tourist can bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub location: String,
}

impl Site {
    pub fn new(id: &str, name: &str, location: &str) -> Self {
        Site {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
        }
    }
}

// ============================================================================
// PREFERENCE BOOK
// ============================================================================

#[derive(Debug, Default)]
pub struct PreferenceBook {
    preferences: HashMap<String, SearchPreferences>,
    bookmarks: HashMap<String, Vec<Site>>,
}

impl PreferenceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tourist ids are compared without surrounding whitespace
    fn key(tourist_id: &str) -> &str {
        tourist_id.trim()
    }

    /// Stored preferences, or the defaults when the tourist never saved any
    pub fn preferences(&self, tourist_id: &str) -> SearchPreferences {
        let key = Self::key(tourist_id);
        self.preferences
            .get(key)
            .cloned()
            .unwrap_or_else(|| SearchPreferences::defaults_for(key))
    }

    pub fn modify(
        &mut self,
        tourist_id: &str,
        mut prefs: SearchPreferences,
    ) -> ServiceResult<ModifyOutcome> {
        prefs.tourist_id = Self::key(tourist_id).to_string();
        prefs.validate()?;

        if self.preferences(&prefs.tourist_id) == prefs {
            return Ok(ModifyOutcome::Unchanged);
        }

        self.preferences.insert(prefs.tourist_id.clone(), prefs);
        Ok(ModifyOutcome::Saved)
    }

    /// Forget saved preferences, returning to the defaults
    pub fn reset(&mut self, tourist_id: &str) -> SearchPreferences {
        let key = Self::key(tourist_id);
        self.preferences.remove(key);
        SearchPreferences::defaults_for(key)
    }

    pub fn bookmark(&mut self, tourist_id: &str, site: Site) -> ServiceResult<()> {
        FieldChecks::new("Site")
            .non_empty("tourist_id", tourist_id)
            .non_empty("id", &site.id)
            .non_empty("name", &site.name)
            .finish()?;

        let sites = self.bookmarks.entry(Self::key(tourist_id).to_string()).or_default();
        if sites.iter().any(|s| s.id == site.id) {
            return Err(ServiceError::duplicate("Bookmark", site.id));
        }

        sites.push(site);
        Ok(())
    }

    pub fn remove_bookmark(&mut self, tourist_id: &str, site_id: &str) -> ServiceResult<Site> {
        let sites = self
            .bookmarks
            .get_mut(Self::key(tourist_id))
            .ok_or_else(|| ServiceError::not_found("Bookmark", site_id))?;

        let index = sites
            .iter()
            .position(|s| s.id == site_id)
            .ok_or_else(|| ServiceError::not_found("Bookmark", site_id))?;

        Ok(sites.remove(index))
    }

    pub fn bookmarks(&self, tourist_id: &str) -> Vec<Site> {
        self.bookmarks.get(Self::key(tourist_id)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_saved() {
        let book = PreferenceBook::new();
        let prefs = book.preferences("t1");
        assert_eq!(prefs.tourist_id, "t1");
        assert_eq!(prefs.destination, DestinationType::City);
        assert_eq!(prefs.max_budget, 1000);
        assert_eq!(prefs.max_distance_km, 500);
        assert_eq!(prefs.accommodation, Accommodation::Hotel);
        assert_eq!(prefs.food, FoodPreference::Any);
    }

    #[test]
    fn test_modify_then_unchanged() {
        let mut book = PreferenceBook::new();
        let mut prefs = SearchPreferences::defaults_for("t1");
        prefs.destination = DestinationType::Beach;
        prefs.family_friendly = true;

        assert_eq!(book.modify("t1", prefs.clone()).unwrap(), ModifyOutcome::Saved);
        assert_eq!(book.modify("t1", prefs).unwrap(), ModifyOutcome::Unchanged);
        assert_eq!(book.preferences("t1").destination, DestinationType::Beach);
    }

    #[test]
    fn test_saving_defaults_is_unchanged() {
        let mut book = PreferenceBook::new();
        let outcome = book.modify("t1", SearchPreferences::defaults_for("t1")).unwrap();
        assert_eq!(outcome, ModifyOutcome::Unchanged);
    }

    #[test]
    fn test_out_of_range_budget_rejected() {
        let mut book = PreferenceBook::new();
        let mut prefs = SearchPreferences::defaults_for("t1");
        prefs.max_budget = 50;
        prefs.max_distance_km = 5000;

        let err = book.modify("t1", prefs).unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "max_budget");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(book.preferences("t1").max_budget, 1000);
    }

    #[test]
    fn test_tourist_id_whitespace_ignored() {
        let mut book = PreferenceBook::new();
        let mut prefs = SearchPreferences::defaults_for("t1");
        prefs.destination = DestinationType::Mountain;
        book.modify(" t1 ", prefs).unwrap();

        assert_eq!(book.preferences("t1").destination, DestinationType::Mountain);
        assert_eq!(book.preferences("t1 ").tourist_id, "t1");

        book.bookmark(" t1", Site::new("s1", "Pantheon", "Rome")).unwrap();
        assert_eq!(book.bookmarks("t1").len(), 1);
        assert!(book.remove_bookmark("t1 ", "s1").is_ok());

        assert_eq!(book.reset("\tt1").destination, DestinationType::City);
        assert_eq!(book.preferences("t1").destination, DestinationType::City);
    }

    #[test]
    fn test_reset() {
        let mut book = PreferenceBook::new();
        let mut prefs = SearchPreferences::defaults_for("t1");
        prefs.adventure = true;
        book.modify("t1", prefs).unwrap();

        let reset = book.reset("t1");
        assert!(!reset.adventure);
        assert_eq!(book.preferences("t1"), SearchPreferences::defaults_for("t1"));
    }

    #[test]
    fn test_bookmarks() {
        let mut book = PreferenceBook::new();
        book.bookmark("t1", Site::new("s1", "Colosseum", "Rome")).unwrap();
        book.bookmark("t1", Site::new("s2", "Pantheon", "Rome")).unwrap();

        let err = book
            .bookmark("t1", Site::new("s1", "Colosseum", "Rome"))
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate");

        let names: Vec<String> = book.bookmarks("t1").into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Colosseum", "Pantheon"]);

        let removed = book.remove_bookmark("t1", "s1").unwrap();
        assert_eq!(removed.name, "Colosseum");
        assert_eq!(book.bookmarks("t1").len(), 1);

        assert_eq!(book.remove_bookmark("t1", "s1").unwrap_err().kind(), "not_found");
        assert_eq!(book.remove_bookmark("t2", "s1").unwrap_err().kind(), "not_found");
    }
}
