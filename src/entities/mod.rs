//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the catalog tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

/// Performers
pub mod artist;
/// Queued venue changes awaiting review
pub mod pending_venue_edit;
/// Scheduled shows and their lifecycle status
pub mod show;
/// Show to artist links with billing
pub mod show_artist;
/// Show to venue links
pub mod show_venue;
/// Places where shows happen
pub mod venue;

// Re-export specific types to avoid conflicts
pub use artist::{Column as ArtistColumn, Entity as Artist, Model as ArtistModel};
pub use pending_venue_edit::{
    Column as PendingVenueEditColumn, EditStatus, Entity as PendingVenueEdit,
    Model as PendingVenueEditModel,
};
pub use show::{Column as ShowColumn, Entity as Show, Model as ShowModel, ShowSource, ShowStatus};
pub use show_artist::{Entity as ShowArtist, Model as ShowArtistModel};
pub use show_venue::{Entity as ShowVenue, Model as ShowVenueModel};
pub use venue::{Column as VenueColumn, Entity as Venue, Model as VenueModel};
