//! Show entity - A single scheduled live-music event.
//!
//! A show owns its venue and artist associations through the `show_venues` and
//! `show_artists` join tables. Its visibility is governed by [`ShowStatus`], which
//! only moves along the edges of the lifecycle transition table in `core::lifecycle`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Moderation status of a show, stored as a lowercase string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    /// Awaiting admin review
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Publicly visible
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Refused by an admin; terminal for the automatic flow
    #[sea_orm(string_value = "rejected")]
    Rejected,
    /// Visible only to the submitter
    #[sea_orm(string_value = "private")]
    Private,
}

impl ShowStatus {
    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry point a show came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum ShowSource {
    /// Direct submission
    #[sea_orm(string_value = "user")]
    User,
    /// Markdown import (single or bulk)
    #[sea_orm(string_value = "import")]
    Import,
    /// Externally scraped discovery event
    #[sea_orm(string_value = "discovery")]
    Discovery,
}

/// Show database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shows")]
pub struct Model {
    /// Unique identifier for the show
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display title (usually the headliner)
    pub title: String,
    /// URL slug derived from title and date
    #[sea_orm(unique)]
    pub slug: String,
    /// Start of the show
    pub event_date: DateTimeUtc,
    /// City override when it differs from the venue's
    pub city: Option<String>,
    /// State override when it differs from the venue's
    pub state: Option<String>,
    /// Ticket price in dollars
    pub price: Option<f64>,
    /// Free-form age policy, e.g. `"21+"` or `"All Ages"`
    pub age_requirement: Option<String>,
    /// Free-text details
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// Where to buy tickets
    pub ticket_url: Option<String>,
    /// Lifecycle status
    pub status: ShowStatus,
    /// Flag shown next to the listing
    pub is_sold_out: bool,
    /// Cancelled shows stay listed but marked
    pub is_cancelled: bool,
    /// User id of the original submitter
    pub submitted_by: i64,
    /// Reason given when an admin rejected the show
    pub rejection_reason: Option<String>,
    /// How the show entered the catalog
    pub source: ShowSource,
    /// Identifier assigned by the scraper for discovery imports
    pub external_id: Option<String>,
    /// When the show was submitted
    pub created_at: DateTimeUtc,
    /// Last change to this row
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Show and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One show has many venue links
    #[sea_orm(has_many = "super::show_venue::Entity")]
    ShowVenues,
    /// One show has many artist links
    #[sea_orm(has_many = "super::show_artist::Entity")]
    ShowArtists,
}

impl Related<super::show_venue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowVenues.def()
    }
}

impl Related<super::show_artist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShowArtists.def()
    }
}

impl Related<super::venue::Entity> for Entity {
    fn to() -> RelationDef {
        super::show_venue::Relation::Venue.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::show_venue::Relation::Show.def().rev())
    }
}

impl Related<super::artist::Entity> for Entity {
    fn to() -> RelationDef {
        super::show_artist::Relation::Artist.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::show_artist::Relation::Show.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
