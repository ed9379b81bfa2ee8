// eTour - tourism management: refreshment points, banners, tourist preferences

pub mod banner;
pub mod preferences;
pub mod refreshment;
pub mod service;

pub use banner::{Banner, BannerRegistry, ImageDescriptor, ImageFormat, ImageRules};
pub use preferences::{
    Accommodation, DestinationType, FoodPreference, ModifyOutcome, PreferenceBook,
    SearchPreferences, Site,
};
pub use refreshment::{RefreshmentPoint, RefreshmentPointDraft, RefreshmentPointRegistry};
pub use service::{Etour, ETOUR_SERVER, SAMPLE_OPERATOR, SAMPLE_TOURIST};
