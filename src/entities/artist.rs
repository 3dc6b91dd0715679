//! Artist entity - A performer that can appear on many shows.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Artist database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "artists")]
pub struct Model {
    /// Unique identifier for the artist
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name as first submitted
    pub name: String,
    /// URL slug, e.g. `"dry-cleaning"`
    #[sea_orm(unique)]
    pub slug: String,
    /// Lowercased name; artists are identified case-insensitively
    #[sea_orm(unique)]
    pub identity_key: String,
    /// Bandcamp page, if known
    pub bandcamp_url: Option<String>,
    /// Spotify artist page, if known
    pub spotify_url: Option<String>,
    /// When the artist was first resolved
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Artist and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One artist appears on many shows
    #[sea_orm(has_many = "super::show_artist::Entity")]
    ShowArtists,
}

impl Related<super::show_artist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowArtists.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
