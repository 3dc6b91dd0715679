//! Entity resolution - find-or-create for venues and artists.
//!
//! A venue is identified by its case-insensitive `(name, city, state)`, an artist by its
//! case-insensitive name. A match is returned untouched; only brand-new records pick up
//! the supplied attributes.
//!
//! Concurrent resolvers are not serialized in-process. Each insert runs in a nested
//! transaction (a savepoint when called inside one) and a uniqueness violation on the
//! identity key is answered by re-selecting the row the other writer committed.

use crate::{
    core::{
        actor::Actor,
        slug::{slugify, unique_slug},
    },
    entities::{Artist, Venue, artist, venue},
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const INSERT_ATTEMPTS: usize = 3;

/// Descriptive fields for a venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueInput {
    /// Venue name
    pub name: String,
    /// City
    pub city: String,
    /// State or region code
    pub state: String,
    /// Street address, stored on creation only
    #[serde(default)]
    pub address: Option<String>,
    /// Postal code, stored on creation only
    #[serde(default)]
    pub zipcode: Option<String>,
}

/// A venue named either by id or by description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VenueRef {
    /// A venue id that must already exist
    Existing(i64),
    /// Find or create by `(name, city, state)`
    Described(VenueInput),
}

/// Descriptive fields for an artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistInput {
    /// Artist name
    pub name: String,
    /// Bandcamp page, stored on creation only
    #[serde(default)]
    pub bandcamp_url: Option<String>,
    /// Spotify page, stored on creation only
    #[serde(default)]
    pub spotify_url: Option<String>,
}

impl ArtistInput {
    /// An artist with just a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bandcamp_url: None,
            spotify_url: None,
        }
    }
}

/// An artist named either by id or by description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtistRef {
    /// An artist id that must already exist
    Existing(i64),
    /// Find or create by name
    Described(ArtistInput),
}

/// Outcome of a writing resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// Matched or inserted record
    pub entity: T,
    /// True when this call inserted the record
    pub was_created: bool,
}

/// Outcome of a read-only resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// A matching record already exists
    Existing(T),
    /// Nothing matches; a writing resolution would insert
    WillCreate,
}

impl<T> Lookup<T> {
    /// Whether a writing resolution would create a record.
    #[must_use]
    pub const fn will_create(&self) -> bool {
        matches!(self, Self::WillCreate)
    }
}

fn normalize(part: &str) -> String {
    part.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Case-insensitive identity of a venue.
#[must_use]
pub fn venue_identity_key(name: &str, city: &str, state: &str) -> String {
    format!("{}|{}|{}", normalize(name), normalize(city), normalize(state))
}

/// Case-insensitive identity of an artist.
#[must_use]
pub fn artist_identity_key(name: &str) -> String {
    normalize(name)
}

fn validate_venue_input(input: &VenueInput) -> Result<()> {
    for (field, value) in [
        ("name", &input.name),
        ("city", &input.city),
        ("state", &input.state),
    ] {
        if value.trim().is_empty() {
            return Err(Error::validation(format!("venue {field} is required")));
        }
    }
    Ok(())
}

fn validate_artist_input(input: &ArtistInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(Error::validation("artist name is required"));
    }
    Ok(())
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Finds a venue by identity without writing anything.
pub async fn find_venue<C>(db: &C, input: &VenueInput) -> Result<Option<venue::Model>>
where
    C: ConnectionTrait,
{
    let key = venue_identity_key(&input.name, &input.city, &input.state);
    Venue::find()
        .filter(venue::Column::IdentityKey.eq(key))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds an artist by identity without writing anything.
pub async fn find_artist<C>(db: &C, name: &str) -> Result<Option<artist::Model>>
where
    C: ConnectionTrait,
{
    Artist::find()
        .filter(artist::Column::IdentityKey.eq(artist_identity_key(name)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a venue by slug.
pub async fn find_venue_by_slug<C>(db: &C, slug: &str) -> Result<Option<venue::Model>>
where
    C: ConnectionTrait,
{
    Venue::find()
        .filter(venue::Column::Slug.eq(slug))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Read-only venue resolution, used by import preview and discovery dry runs.
pub async fn lookup_venue<C>(db: &C, venue_ref: &VenueRef) -> Result<Lookup<venue::Model>>
where
    C: ConnectionTrait,
{
    match venue_ref {
        VenueRef::Existing(id) => Venue::find_by_id(*id)
            .one(db)
            .await?
            .map(Lookup::Existing)
            .ok_or_else(|| Error::not_found("venue", id)),
        VenueRef::Described(input) => {
            validate_venue_input(input)?;
            Ok(find_venue(db, input)
                .await?
                .map_or(Lookup::WillCreate, Lookup::Existing))
        }
    }
}

/// Read-only artist resolution.
pub async fn lookup_artist<C>(db: &C, artist_ref: &ArtistRef) -> Result<Lookup<artist::Model>>
where
    C: ConnectionTrait,
{
    match artist_ref {
        ArtistRef::Existing(id) => Artist::find_by_id(*id)
            .one(db)
            .await?
            .map(Lookup::Existing)
            .ok_or_else(|| Error::not_found("artist", id)),
        ArtistRef::Described(input) => {
            validate_artist_input(input)?;
            Ok(find_artist(db, &input.name)
                .await?
                .map_or(Lookup::WillCreate, Lookup::Existing))
        }
    }
}

/// Finds or creates a venue.
///
/// New venues are `verified` only when the actor is an admin. Pass a transaction as `db`
/// to make the insert part of a larger unit of work.
pub async fn resolve_venue<C>(
    db: &C,
    venue_ref: &VenueRef,
    actor: &Actor,
) -> Result<Resolved<venue::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let input = match venue_ref {
        VenueRef::Existing(id) => {
            let entity = Venue::find_by_id(*id)
                .one(db)
                .await?
                .ok_or_else(|| Error::not_found("venue", id))?;
            return Ok(Resolved {
                entity,
                was_created: false,
            });
        }
        VenueRef::Described(input) => input,
    };

    validate_venue_input(input)?;
    if let Some(entity) = find_venue(db, input).await? {
        return Ok(Resolved {
            entity,
            was_created: false,
        });
    }

    let name = input.name.trim().to_string();
    let mut last_err = None;
    for _ in 0..INSERT_ATTEMPTS {
        let slug = unique_slug::<_, Venue>(db, venue::Column::Slug, &slugify(&name)).await?;
        let now = chrono::Utc::now();
        let model = venue::ActiveModel {
            name: Set(name.clone()),
            slug: Set(slug),
            city: Set(input.city.trim().to_string()),
            state: Set(input.state.trim().to_string()),
            address: Set(trimmed(input.address.as_ref())),
            zipcode: Set(trimmed(input.zipcode.as_ref())),
            verified: Set(actor.is_admin),
            submitted_by: Set(actor.user_id),
            identity_key: Set(venue_identity_key(&input.name, &input.city, &input.state)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let savepoint = db.begin().await?;
        match model.insert(&savepoint).await {
            Ok(entity) => {
                savepoint.commit().await?;
                info!(venue_id = entity.id, name = %entity.name, verified = entity.verified, "Created venue");
                return Ok(Resolved {
                    entity,
                    was_created: true,
                });
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                debug!(name = %name, "Venue insert raced another writer, re-selecting");
                if let Some(entity) = find_venue(db, input).await? {
                    return Ok(Resolved {
                        entity,
                        was_created: false,
                    });
                }
                // Slug collision with an unrelated venue; pick a fresh slug and retry.
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err.map_or_else(
        || Error::conflict(format!("could not create venue {name}")),
        Error::Database,
    ))
}

/// Finds or creates an artist.
pub async fn resolve_artist<C>(db: &C, artist_ref: &ArtistRef) -> Result<Resolved<artist::Model>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let input = match artist_ref {
        ArtistRef::Existing(id) => {
            let entity = Artist::find_by_id(*id)
                .one(db)
                .await?
                .ok_or_else(|| Error::not_found("artist", id))?;
            return Ok(Resolved {
                entity,
                was_created: false,
            });
        }
        ArtistRef::Described(input) => input,
    };

    validate_artist_input(input)?;
    if let Some(entity) = find_artist(db, &input.name).await? {
        return Ok(Resolved {
            entity,
            was_created: false,
        });
    }

    let name = input.name.trim().to_string();
    let mut last_err = None;
    for _ in 0..INSERT_ATTEMPTS {
        let slug = unique_slug::<_, Artist>(db, artist::Column::Slug, &slugify(&name)).await?;
        let model = artist::ActiveModel {
            name: Set(name.clone()),
            slug: Set(slug),
            identity_key: Set(artist_identity_key(&name)),
            bandcamp_url: Set(trimmed(input.bandcamp_url.as_ref())),
            spotify_url: Set(trimmed(input.spotify_url.as_ref())),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        };

        let savepoint = db.begin().await?;
        match model.insert(&savepoint).await {
            Ok(entity) => {
                savepoint.commit().await?;
                info!(artist_id = entity.id, name = %entity.name, "Created artist");
                return Ok(Resolved {
                    entity,
                    was_created: true,
                });
            }
            Err(err) if is_unique_violation(&err) => {
                savepoint.rollback().await?;
                debug!(name = %name, "Artist insert raced another writer, re-selecting");
                if let Some(entity) = find_artist(db, &name).await? {
                    return Ok(Resolved {
                        entity,
                        was_created: false,
                    });
                }
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err.map_or_else(
        || Error::conflict(format!("could not create artist {name}")),
        Error::Database,
    ))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase, PaginatorTrait};

    #[tokio::test]
    async fn test_resolve_venue_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let venue_ref = VenueRef::Described(venue_input("Valley Bar", "Phoenix", "AZ"));

        let first = resolve_venue(&db, &venue_ref, &member(10)).await?;
        assert!(first.was_created);
        assert!(!first.entity.verified);
        assert_eq!(first.entity.slug, "valley-bar");

        let second = resolve_venue(&db, &venue_ref, &member(11)).await?;
        assert!(!second.was_created);
        assert_eq!(second.entity.id, first.entity.id);
        assert_eq!(Venue::find().count(&db).await?, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_venue_matches_case_insensitively() -> Result<()> {
        let db = setup_test_db().await?;
        let created = resolve_venue(
            &db,
            &VenueRef::Described(venue_input("Valley Bar", "Phoenix", "AZ")),
            &member(10),
        )
        .await?;

        let mut shouted = venue_input("VALLEY  bar", "phoenix", "az");
        shouted.address = Some("130 N Central Ave".to_string());
        let matched = resolve_venue(&db, &VenueRef::Described(shouted), &admin()).await?;

        assert!(!matched.was_created);
        assert_eq!(matched.entity.id, created.entity.id);
        // Matched entities are never mutated.
        assert_eq!(matched.entity.address, None);
        assert!(!matched.entity.verified);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_created_venue_is_verified() -> Result<()> {
        let db = setup_test_db().await?;
        let resolved = resolve_venue(
            &db,
            &VenueRef::Described(venue_input("Crescent Ballroom", "Phoenix", "AZ")),
            &admin(),
        )
        .await?;
        assert!(resolved.was_created);
        assert!(resolved.entity.verified);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_name_different_city_gets_distinct_slug() -> Result<()> {
        let db = setup_test_db().await?;
        let phoenix = resolve_venue(
            &db,
            &VenueRef::Described(venue_input("The Rebel Lounge", "Phoenix", "AZ")),
            &member(1),
        )
        .await?;
        let tucson = resolve_venue(
            &db,
            &VenueRef::Described(venue_input("The Rebel Lounge", "Tucson", "AZ")),
            &member(1),
        )
        .await?;
        assert!(tucson.was_created);
        assert_ne!(phoenix.entity.id, tucson.entity.id);
        assert_eq!(tucson.entity.slug, "the-rebel-lounge-2");
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_by_id() -> Result<()> {
        let db = setup_test_db().await?;
        let venue = create_test_venue(&db, "Valley Bar", false).await?;

        let resolved = resolve_venue(&db, &VenueRef::Existing(venue.id), &member(1)).await?;
        assert!(!resolved.was_created);
        assert_eq!(resolved.entity, venue);

        let missing = resolve_venue(&db, &VenueRef::Existing(999), &member(1)).await;
        assert!(matches!(missing, Err(Error::NotFound { entity: "venue", .. })));

        let missing_artist = resolve_artist(&db, &ArtistRef::Existing(999)).await;
        assert!(matches!(
            missing_artist,
            Err(Error::NotFound { entity: "artist", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_is_read_only() -> Result<()> {
        let db = setup_test_db().await?;
        let lookup = lookup_venue(
            &db,
            &VenueRef::Described(venue_input("Yucca Tap Room", "Tempe", "AZ")),
        )
        .await?;
        assert!(lookup.will_create());

        let artist = lookup_artist(&db, &ArtistRef::Described(ArtistInput::named("Playboy Manbaby")))
            .await?;
        assert!(artist.will_create());

        assert_eq!(Venue::find().count(&db).await?, 0);
        assert_eq!(Artist::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_artist_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let first = resolve_artist(&db, &ArtistRef::Described(ArtistInput::named("Dry Cleaning")))
            .await?;
        let second = resolve_artist(&db, &ArtistRef::Described(ArtistInput::named("dry cleaning")))
            .await?;
        assert!(first.was_created);
        assert!(!second.was_created);
        assert_eq!(first.entity.id, second.entity.id);
        assert_eq!(first.entity.name, "Dry Cleaning");
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_resolution_creates_one_venue() -> Result<()> {
        let db = setup_test_db().await?;
        let venue_ref = VenueRef::Described(venue_input("Valley Bar", "Phoenix", "AZ"));
        let (first, second) = (member(1), member(2));

        let (a, b) = tokio::join!(
            resolve_venue(&db, &venue_ref, &first),
            resolve_venue(&db, &venue_ref, &second),
        );
        let (a, b) = (a?, b?);

        assert_eq!(a.entity.id, b.entity.id);
        assert!(a.was_created ^ b.was_created);
        assert_eq!(Venue::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_query() {
        // No query results are configured: reaching the database would fail differently.
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = resolve_venue(
            &db,
            &VenueRef::Described(venue_input("", "Phoenix", "AZ")),
            &member(1),
        )
        .await;
        assert!(matches!(result, Err(Error::ValidationFailed { .. })));

        let result = resolve_artist(&db, &ArtistRef::Described(ArtistInput::named("  "))).await;
        assert!(matches!(result, Err(Error::ValidationFailed { .. })));
    }
}
