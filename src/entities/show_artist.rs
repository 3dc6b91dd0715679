//! Join between shows and artists, carrying the headliner flag.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// `show_artists` join row
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "show_artists")]
pub struct Model {
    /// Show on the bill
    #[sea_orm(primary_key, auto_increment = false)]
    pub show_id: i64,
    /// Billed artist
    #[sea_orm(primary_key, auto_increment = false)]
    pub artist_id: i64,
    /// Headliners are listed first
    pub is_headliner: bool,
    /// Billing order within the show
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
    /// Each link points at one artist
    #[sea_orm(
        belongs_to = "super::artist::Entity",
        from = "Column::ArtistId",
        to = "super::artist::Column::Id"
    )]
    Artist,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl Related<super::artist::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Artist.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
