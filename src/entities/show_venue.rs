//! Join between shows and venues. No lifecycle of its own.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `show_venues` join row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "show_venues")]
pub struct Model {
    /// Linked show
    #[sea_orm(primary_key, auto_increment = false)]
    pub show_id: i64,
    /// Linked venue
    #[sea_orm(primary_key, auto_increment = false)]
    pub venue_id: i64,
    /// Insertion order within the show
    pub position: i32,
}

/// Defines relationships between the join row and its ends
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each link belongs to one show
    #[sea_orm(
        belongs_to = "super::show::Entity",
        from = "Column::ShowId",
        to = "super::show::Column::Id",
        on_delete = "Cascade"
    )]
    Show,
    /// Each link points at one venue
    #[sea_orm(
        belongs_to = "super::venue::Entity",
        from = "Column::VenueId",
        to = "super::venue::Column::Id"
    )]
    Venue,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl Related<super::venue::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Venue.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
