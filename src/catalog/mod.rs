pub mod embedding;
pub mod items;
pub mod likes;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::config::Config;
use crate::embed::Embedding;
use crate::store::sqlite::Store;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new_random() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_u128(value: u128) -> Self {
                Self(Uuid::from_u128(value))
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.hyphenated().fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a catalog item.
    ItemId
);
uuid_id!(
    /// Identifier of a user recorded in the likes table.
    UserId
);

/// Descriptive fields of an item. These are what the embedder sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub actors: Vec<String>,
}

impl ItemMetadata {
    /// New catalog entries need at least a title and a description.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            bail!("title is required");
        }
        if self.description.as_deref().is_none_or(|d| d.trim().is_empty()) {
            bail!("description is required");
        }
        Ok(())
    }

    /// Apply a partial update. Fields left as `None` in the patch are kept.
    pub fn apply(&mut self, patch: MetadataPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(genres) = patch.genres {
            self.genres = genres;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        if let Some(year) = patch.release_year {
            self.release_year = Some(year);
        }
        if let Some(director) = patch.director {
            self.director = Some(director);
        }
        if let Some(actors) = patch.actors {
            self.actors = actors;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genres: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub release_year: Option<i32>,
    pub director: Option<String>,
    pub actors: Option<Vec<String>>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.genres.is_none()
            && self.tags.is_none()
            && self.release_year.is_none()
            && self.director.is_none()
            && self.actors.is_none()
    }
}

/// A stored item with its metadata and embedding bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub metadata: ItemMetadata,
    pub embedded_model: Option<String>,
    pub embedded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The (id, title, year) view returned by lookups and recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSummary {
    pub id: ItemId,
    pub title: String,
    pub release_year: Option<i32>,
}

/// Which columns a catalog scan has to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fields {
    Summary,
    WithVector,
}

/// One row of a catalog scan. `vector` is only populated for [`Fields::WithVector`].
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub summary: ItemSummary,
    pub vector: Option<Embedding>,
}

/// Open (creating if needed) the store for a project root.
pub fn open_store(root: &Path, config: &Config) -> Result<Store> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving path {}", root.display()))?;
    Store::open(&config.storage_dir(&root))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_parses_hyphenated_uuid() {
        let id: ItemId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn item_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<ItemId>().is_err());
        assert!("".parse::<ItemId>().is_err());
    }

    #[test]
    fn item_ids_order_by_uuid() {
        assert!(ItemId::from_u128(1) < ItemId::from_u128(2));
    }

    #[test]
    fn validate_requires_title_and_description() {
        let mut meta = ItemMetadata {
            title: "Alien".into(),
            ..Default::default()
        };
        assert!(meta.validate().is_err());
        meta.description = Some("   ".into());
        assert!(meta.validate().is_err());
        meta.description = Some("In space no one can hear you scream".into());
        assert!(meta.validate().is_ok());
        meta.title = " ".into();
        assert!(meta.validate().is_err());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut meta = ItemMetadata {
            title: "Heat".into(),
            description: Some("Cops and robbers".into()),
            genres: vec!["Crime".into()],
            release_year: Some(1995),
            ..Default::default()
        };
        meta.apply(MetadataPatch {
            title: Some("Heat (1995)".into()),
            actors: Some(vec!["Al Pacino".into()]),
            ..Default::default()
        });
        assert_eq!(meta.title, "Heat (1995)");
        assert_eq!(meta.genres, vec!["Crime".to_string()]);
        assert_eq!(meta.release_year, Some(1995));
        assert_eq!(meta.actors, vec!["Al Pacino".to_string()]);
    }

    #[test]
    fn metadata_deserializes_with_missing_lists() {
        let meta: ItemMetadata =
            serde_json::from_str(r#"{"title":"Up","description":"Balloons"}"#).unwrap();
        assert!(meta.genres.is_empty());
        assert!(meta.release_year.is_none());
    }
}
