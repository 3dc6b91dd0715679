//! Pending venue edit entity - A queued change to a verified venue.
//!
//! Non-admins cannot mutate verified venues directly. Their change is stored here as
//! an opaque JSON diff until an admin approves (row deleted, diff applied) or
//! rejects it (row kept with status `rejected` for audit).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Review status of a proposed edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    /// Waiting for an admin
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Applied to the venue
    #[sea_orm(string_value = "approved")]
    Approved,
    /// Refused; kept for the audit trail
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// Pending venue edit database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pending_venue_edits")]
pub struct Model {
    /// Unique identifier for the edit
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Venue the edit targets
    pub venue_id: i64,
    /// User who proposed the change
    pub proposed_by: i64,
    /// Field diff, see `core::venue_edits::VenueChanges`
    pub proposed_changes: Json,
    /// Review status
    pub status: EditStatus,
    /// Admin who reviewed the edit
    pub reviewed_by: Option<i64>,
    /// When the edit was reviewed
    pub reviewed_at: Option<DateTimeUtc>,
    /// Reason given on rejection
    pub rejection_reason: Option<String>,
    /// When the edit was proposed
    pub created_at: DateTimeUtc,
    /// Last change to this row
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between PendingVenueEdit and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each edit targets one venue
    #[sea_orm(
        belongs_to = "super::venue::Entity",
        from = "Column::VenueId",
        to = "super::venue::Column::Id",
        on_delete = "Cascade"
    )]
    Venue,
}

impl Related<super::venue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Venue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
