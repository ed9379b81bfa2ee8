// 🖼️ Banner Entity - advertising images attached to refreshment points
//
// Rules:
// - only jpg/jpeg/png/gif images, within byte and pixel limits
// - at most N current banners per point (configurable, default 5)
// - the same image (by normalised path) can't be attached twice to a point

use crate::config::EtourConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{VersionMeta, Versioned, VersionedStore};
use crate::validation::{FieldChecks, ValidationResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// IMAGE FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Detect the format from the file extension (case-insensitive)
    pub fn from_path(path: &str) -> Option<Self> {
        let extension = path.trim().rsplit_once('.')?.1.to_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
        }
    }
}

// ============================================================================
// IMAGE DESCRIPTOR
// ============================================================================

/// What the operator selected in the file chooser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub path: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
}

impl ImageDescriptor {
    pub fn new(path: &str, size_bytes: u64, width: u32, height: u32) -> Self {
        ImageDescriptor {
            path: path.trim().to_string(),
            size_bytes,
            width,
            height,
        }
    }

    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_path(&self.path)
    }

    /// sha256 of the normalised path (lowercase, forward slashes)
    pub fn fingerprint(&self) -> String {
        let normalised = self.path.trim().replace('\\', "/").to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalised.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// Byte and pixel limits an image must respect
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRules {
    pub max_bytes: u64,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl ImageRules {
    pub fn from_config(config: &EtourConfig) -> Self {
        ImageRules {
            max_bytes: config.max_image_bytes,
            min_width: config.min_width,
            min_height: config.min_height,
            max_width: config.max_width,
            max_height: config.max_height,
        }
    }

    pub fn check(&self, image: &ImageDescriptor) -> ValidationResult {
        let mut checks = FieldChecks::new("Banner").non_empty("image", &image.path);

        if !image.path.trim().is_empty() {
            checks = checks.custom(
                "image",
                image.format().is_some(),
                "Unsupported image format (allowed: jpg, jpeg, png, gif)",
            );
        }

        checks
            .custom("size", image.size_bytes > 0, "Image file is empty")
            .range("size", image.size_bytes, 0, self.max_bytes)
            .range("width", image.width, self.min_width, self.max_width)
            .range("height", image.height, self.min_height, self.max_height)
            .finish()
    }
}

impl Default for ImageRules {
    fn default() -> Self {
        Self::from_config(&EtourConfig::default())
    }
}

// ============================================================================
// BANNER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub id: String,

    /// Owning refreshment point
    pub point_id: String,

    pub image: ImageDescriptor,

    pub uploaded_by: String,

    pub meta: VersionMeta,
}

impl Versioned for Banner {
    const ENTITY: &'static str = "Banner";

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

impl Banner {
    pub fn new(point_id: &str, image: ImageDescriptor, uploaded_by: &str) -> Self {
        Banner {
            id: uuid::Uuid::new_v4().to_string(),
            point_id: point_id.to_string(),
            image,
            uploaded_by: uploaded_by.to_string(),
            meta: VersionMeta::new(),
        }
    }
}

// ============================================================================
// BANNER REGISTRY
// ============================================================================

#[derive(Clone, Default)]
pub struct BannerRegistry {
    banners: VersionedStore<Banner>,
}

impl BannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new banner to a point
    pub fn insert(
        &self,
        point_id: &str,
        image: ImageDescriptor,
        uploaded_by: &str,
        rules: &ImageRules,
        max_per_point: usize,
    ) -> ServiceResult<Banner> {
        rules.check(&image)?;

        let existing = self.for_point(point_id)?;
        if existing.len() >= max_per_point {
            return Err(ServiceError::LimitReached {
                entity: "banners",
                limit: max_per_point,
            });
        }

        let fingerprint = image.fingerprint();
        if existing.iter().any(|b| b.image.fingerprint() == fingerprint) {
            return Err(ServiceError::duplicate("Banner", image.path.clone()));
        }

        self.banners.insert(Banner::new(point_id, image, uploaded_by))
    }

    /// Replace the image of an existing banner
    pub fn modify_image(
        &self,
        banner_id: &str,
        image: ImageDescriptor,
        rules: &ImageRules,
    ) -> ServiceResult<Banner> {
        rules.check(&image)?;

        let current = self.banners.get(banner_id)?;
        let fingerprint = image.fingerprint();
        let clash = self
            .for_point(&current.point_id)?
            .into_iter()
            .any(|b| b.id != banner_id && b.image.fingerprint() == fingerprint);
        if clash {
            return Err(ServiceError::duplicate("Banner", image.path.clone()));
        }

        self.banners.update(banner_id, |banner| {
            banner.image = image;
            Ok(())
        })
    }

    pub fn delete(&self, banner_id: &str) -> ServiceResult<Banner> {
        self.banners.retire(banner_id)
    }

    /// Delete every banner of a point, returning how many went away
    pub fn remove_for_point(&self, point_id: &str) -> ServiceResult<usize> {
        let banners = self.for_point(point_id)?;
        for banner in &banners {
            self.banners.retire(&banner.id)?;
        }
        Ok(banners.len())
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        self.banners.poison();
    }

    pub fn for_point(&self, point_id: &str) -> ServiceResult<Vec<Banner>> {
        self.banners.find(|b| b.point_id == point_id)
    }

    pub fn get(&self, banner_id: &str) -> ServiceResult<Banner> {
        self.banners.get(banner_id)
    }

    pub fn history(&self, banner_id: &str) -> ServiceResult<Vec<Banner>> {
        self.banners.history(banner_id)
    }

    pub fn all(&self) -> ServiceResult<Vec<Banner>> {
        self.banners.all_current()
    }
}
