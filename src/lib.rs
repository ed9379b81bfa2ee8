// eTour / SMOS - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod validation;
pub mod error;
pub mod store;      // Append-only versioned registries
pub mod config;
pub mod link;       // Simulated server connection (failure injection)
pub mod db;         // Audit events (SQLite + WAL) and roster CSV
pub mod etour;      // Tourism: refreshment points, banners, preferences
pub mod smos;       // School: users, classes, register, report cards
pub mod scenarios;

// Re-export commonly used types
pub use config::{AppConfig, EtourConfig, LinkConfig, SmosConfig};
pub use db::{
    AuditTrail, Event, RosterRow,
    open_database, setup_database, insert_event, insert_events,
    get_events_for_entity, get_recent_events, count_events,
    load_roster_csv,
};
pub use error::{ServiceError, ServiceResult};
pub use link::{LinkMode, ServerLink};
pub use store::{VersionMeta, Versioned, VersionedStore};
pub use validation::{FieldChecks, ValidationError, ValidationResult};
pub use etour::Etour;
pub use smos::{Session, Smos};
pub use scenarios::{Scenario, Transcript};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
