//! Venue entity - A place where shows happen.
//!
//! Venues are shared catalog data. Identity is the case-insensitive
//! `(name, city, state)` triple, materialised in `identity_key` so the database
//! enforces uniqueness for concurrent resolvers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Venue database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "venues")]
pub struct Model {
    /// Unique identifier for the venue
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name, e.g. `"Valley Bar"`
    pub name: String,
    /// URL slug, e.g. `"valley-bar"`
    #[sea_orm(unique)]
    pub slug: String,
    /// City the venue is in
    pub city: String,
    /// State or region code, e.g. `"AZ"`
    pub state: String,
    /// Street address
    pub address: Option<String>,
    /// Postal code
    pub zipcode: Option<String>,
    /// Only ever moves false -> true through an explicit verification action
    pub verified: bool,
    /// User who first submitted the venue, if known
    pub submitted_by: Option<i64>,
    /// Lowercased `name|city|state`
    #[sea_orm(unique)]
    pub identity_key: String,
    /// When the venue was first resolved
    pub created_at: DateTimeUtc,
    /// Last change to this row
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Venue and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One venue hosts many shows
    #[sea_orm(has_many = "super::show_venue::Entity")]
    ShowVenues,
    /// One venue can have queued edits
    #[sea_orm(has_many = "super::pending_venue_edit::Entity")]
    PendingEdits,
}

impl Related<super::show_venue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowVenues.def()
    }
}

impl Related<super::pending_venue_edit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PendingEdits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
