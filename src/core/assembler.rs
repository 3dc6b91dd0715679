//! Show assembly - builds or updates a show together with its venue and artist links.
//!
//! Every function here takes the connection it should write through, so callers run
//! them inside their own transaction and decide when to commit. Nothing in this module
//! publishes events; [`AssembledShow::events`] hands the caller what to publish once the
//! transaction has committed.

use crate::{
    core::{
        actor::Actor,
        events::PipelineEvent,
        lifecycle::initial_status,
        resolver::{ArtistRef, Resolved, VenueRef, resolve_artist, resolve_venue},
        slug::{slugify, unique_slug},
    },
    entities::{
        Artist, Show, ShowArtist, ShowSource, ShowStatus, ShowVenue, Venue, artist, show,
        show_artist, show_venue, venue,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// An artist on a draft bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowArtistInput {
    /// Artist to bill
    pub artist: ArtistRef,
    /// Headliners are billed first
    #[serde(default)]
    pub is_headliner: bool,
}

/// Everything needed to create a show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowDraft {
    /// Display title
    pub title: String,
    /// Start of the show
    pub event_date: DateTime<Utc>,
    /// City override
    #[serde(default)]
    pub city: Option<String>,
    /// State override
    #[serde(default)]
    pub state: Option<String>,
    /// Ticket price in dollars; must not be negative
    #[serde(default)]
    pub price: Option<f64>,
    /// Free-form age policy
    #[serde(default)]
    pub age_requirement: Option<String>,
    /// Free-text details
    #[serde(default)]
    pub description: Option<String>,
    /// Where to buy tickets
    #[serde(default)]
    pub ticket_url: Option<String>,
    /// Sold-out flag
    #[serde(default)]
    pub is_sold_out: bool,
    /// Cancelled flag
    #[serde(default)]
    pub is_cancelled: bool,
    /// Submitter asked for the show to stay private
    #[serde(default)]
    pub private: bool,
    /// At least one venue; repeats are linked once
    pub venues: Vec<VenueRef>,
    /// At least one artist; repeats are billed once
    pub artists: Vec<ShowArtistInput>,
    /// Entry point, `user` unless stated
    #[serde(default = "default_source")]
    pub source: ShowSource,
    /// Scraper id for discovery imports
    #[serde(default)]
    pub external_id: Option<String>,
}

const fn default_source() -> ShowSource {
    ShowSource::User
}

/// Field-level changes to an existing show. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowPatch {
    /// New title; may not be blank
    pub title: Option<String>,
    /// New start time
    pub event_date: Option<DateTime<Utc>>,
    /// New city override; blank clears it
    pub city: Option<String>,
    /// New state override; blank clears it
    pub state: Option<String>,
    /// New price
    pub price: Option<f64>,
    /// New age policy; blank clears it
    pub age_requirement: Option<String>,
    /// New description; blank clears it
    pub description: Option<String>,
    /// New ticket link; blank clears it
    pub ticket_url: Option<String>,
    /// New sold-out flag
    pub is_sold_out: Option<bool>,
    /// New cancelled flag
    pub is_cancelled: Option<bool>,
}

impl ShowPatch {
    /// True when the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A show with its venues and billed artists in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowWithRelations {
    /// The show row
    pub show: show::Model,
    /// Linked venues
    pub venues: Vec<venue::Model>,
    /// Bill, headliners first
    pub artists: Vec<BilledArtist>,
}

/// An artist as billed on a particular show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BilledArtist {
    /// The artist row
    pub artist: artist::Model,
    /// Whether the artist headlines this show
    pub is_headliner: bool,
}

/// Result of [`assemble_show`].
#[derive(Debug, Clone)]
pub struct AssembledShow {
    /// The inserted show
    pub show: show::Model,
    /// Resolved venues, noting which were created
    pub venues: Vec<Resolved<venue::Model>>,
    /// Resolved artists with their headliner flag
    pub artists: Vec<(Resolved<artist::Model>, bool)>,
}

impl AssembledShow {
    /// Events to publish after the enclosing transaction commits.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        let mut events = vec![PipelineEvent::ShowSubmitted {
            show_id: self.show.id,
            title: self.show.title.clone(),
            submitted_by: self.show.submitted_by,
            status: self.show.status.to_string(),
        }];
        events.extend(
            self.venues
                .iter()
                .filter(|v| v.was_created)
                .map(|v| PipelineEvent::VenueCreated {
                    venue_id: v.entity.id,
                    name: v.entity.name.clone(),
                    verified: v.entity.verified,
                }),
        );
        events.extend(
            self.artists
                .iter()
                .filter(|(a, _)| a.was_created)
                .map(|(a, _)| PipelineEvent::ArtistCreated {
                    artist_id: a.entity.id,
                    name: a.entity.name.clone(),
                }),
        );
        events
    }

    /// The assembled show in its read shape.
    #[must_use]
    pub fn to_relations(&self) -> ShowWithRelations {
        ShowWithRelations {
            show: self.show.clone(),
            venues: self.venues.iter().map(|v| v.entity.clone()).collect(),
            artists: self
                .artists
                .iter()
                .map(|(a, is_headliner)| BilledArtist {
                    artist: a.entity.clone(),
                    is_headliner: *is_headliner,
                })
                .collect(),
        }
    }
}

fn validate_price(price: Option<f64>) -> Result<()> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(Error::validation(format!("price must be a non-negative amount, got {p}")))
        }
        _ => Ok(()),
    }
}

/// Checks a draft before anything is written.
pub fn validate_draft(draft: &ShowDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(Error::validation("show title is required"));
    }
    if draft.venues.is_empty() {
        return Err(Error::validation("a show needs at least one venue"));
    }
    if draft.artists.is_empty() {
        return Err(Error::validation("a show needs at least one artist"));
    }
    validate_price(draft.price)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Checks a patch before anything is written.
pub fn validate_patch(patch: &ShowPatch) -> Result<()> {
    if patch.title.as_ref().is_some_and(|t| t.trim().is_empty()) {
        return Err(Error::validation("show title cannot be empty"));
    }
    validate_price(patch.price)
}

/// Resolves a venue list, dropping repeats of the same venue.
pub async fn resolve_venues<C>(
    db: &C,
    venues: &[VenueRef],
    actor: &Actor,
) -> Result<Vec<Resolved<venue::Model>>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(venues.len());
    for venue_ref in venues {
        let r = resolve_venue(db, venue_ref, actor).await?;
        if seen.insert(r.entity.id) {
            resolved.push(r);
        }
    }
    Ok(resolved)
}

/// Resolves a bill, dropping repeats and promoting the first act to headliner when
/// nobody was marked.
pub async fn resolve_bill<C>(
    db: &C,
    artists: &[ShowArtistInput],
) -> Result<Vec<(Resolved<artist::Model>, bool)>>
where
    C: ConnectionTrait + TransactionTrait,
{
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(artists.len());
    for input in artists {
        let r = resolve_artist(db, &input.artist).await?;
        if seen.insert(r.entity.id) {
            resolved.push((r, input.is_headliner));
        }
    }
    if !resolved.iter().any(|(_, headliner)| *headliner) {
        if let Some(first) = resolved.first_mut() {
            first.1 = true;
        }
    }
    Ok(resolved)
}

/// Creates a show and its links.
///
/// `status_override` bypasses the usual initial-status rule; discovery uses it to force
/// `pending` for unverified sources.
pub async fn assemble_show<C>(
    db: &C,
    actor: &Actor,
    draft: &ShowDraft,
    status_override: Option<ShowStatus>,
) -> Result<AssembledShow>
where
    C: ConnectionTrait + TransactionTrait,
{
    let submitted_by = actor.id()?;
    validate_draft(draft)?;

    let venues = resolve_venues(db, &draft.venues, actor).await?;
    let artists = resolve_bill(db, &draft.artists).await?;

    let all_verified = venues.iter().all(|v| v.entity.verified);
    let status = status_override
        .unwrap_or_else(|| initial_status(draft.private, actor.is_admin, all_verified));

    let primary = &venues[0].entity;
    let title = draft.title.trim().to_string();
    let base_slug = slugify(&format!("{title} {}", draft.event_date.format("%Y-%m-%d")));
    let slug = unique_slug::<_, Show>(db, show::Column::Slug, &base_slug).await?;
    let now = Utc::now();

    let show = show::ActiveModel {
        title: Set(title),
        slug: Set(slug),
        event_date: Set(draft.event_date),
        city: Set(non_empty(draft.city.as_ref()).or_else(|| Some(primary.city.clone()))),
        state: Set(non_empty(draft.state.as_ref()).or_else(|| Some(primary.state.clone()))),
        price: Set(draft.price),
        age_requirement: Set(non_empty(draft.age_requirement.as_ref())),
        description: Set(non_empty(draft.description.as_ref())),
        ticket_url: Set(non_empty(draft.ticket_url.as_ref())),
        status: Set(status),
        is_sold_out: Set(draft.is_sold_out),
        is_cancelled: Set(draft.is_cancelled),
        submitted_by: Set(submitted_by),
        rejection_reason: Set(None),
        source: Set(draft.source),
        external_id: Set(non_empty(draft.external_id.as_ref())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    link_venues(db, show.id, venues.iter().map(|v| v.entity.id)).await?;
    link_artists(db, show.id, artists.iter().map(|(a, h)| (a.entity.id, *h))).await?;

    info!(show_id = show.id, status = %show.status, venues = venues.len(), artists = artists.len(), "Assembled show");
    Ok(AssembledShow {
        show,
        venues,
        artists,
    })
}

async fn link_venues<C, I>(db: &C, show_id: i64, venue_ids: I) -> Result<()>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = i64>,
{
    for (position, venue_id) in (0_i32..).zip(venue_ids) {
        show_venue::ActiveModel {
            show_id: Set(show_id),
            venue_id: Set(venue_id),
            position: Set(position),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

async fn link_artists<C, I>(db: &C, show_id: i64, artists: I) -> Result<()>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = (i64, bool)>,
{
    for (position, (artist_id, is_headliner)) in (0_i32..).zip(artists) {
        show_artist::ActiveModel {
            show_id: Set(show_id),
            artist_id: Set(artist_id),
            is_headliner: Set(is_headliner),
            position: Set(position),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Applies a field patch to a show.
pub async fn apply_patch<C>(db: &C, show: show::Model, patch: &ShowPatch) -> Result<show::Model>
where
    C: ConnectionTrait,
{
    validate_patch(patch)?;
    let mut active: show::ActiveModel = show.into();

    if let Some(title) = &patch.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(event_date) = patch.event_date {
        active.event_date = Set(event_date);
    }
    if let Some(city) = &patch.city {
        active.city = Set(non_empty(Some(city)));
    }
    if let Some(state) = &patch.state {
        active.state = Set(non_empty(Some(state)));
    }
    if let Some(price) = patch.price {
        active.price = Set(Some(price));
    }
    if let Some(age) = &patch.age_requirement {
        active.age_requirement = Set(non_empty(Some(age)));
    }
    if let Some(description) = &patch.description {
        active.description = Set(non_empty(Some(description)));
    }
    if let Some(url) = &patch.ticket_url {
        active.ticket_url = Set(non_empty(Some(url)));
    }
    if let Some(sold_out) = patch.is_sold_out {
        active.is_sold_out = Set(sold_out);
    }
    if let Some(cancelled) = patch.is_cancelled {
        active.is_cancelled = Set(cancelled);
    }
    active.updated_at = Set(Utc::now());

    active.update(db).await.map_err(Into::into)
}

/// Replaces the venue list of a show. The new list must not be empty.
pub async fn replace_venues<C>(
    db: &C,
    show_id: i64,
    venues: &[VenueRef],
    actor: &Actor,
) -> Result<Vec<Resolved<venue::Model>>>
where
    C: ConnectionTrait + TransactionTrait,
{
    if venues.is_empty() {
        return Err(Error::validation("a show needs at least one venue"));
    }
    let resolved = resolve_venues(db, venues, actor).await?;
    ShowVenue::delete_many()
        .filter(show_venue::Column::ShowId.eq(show_id))
        .exec(db)
        .await?;
    link_venues(db, show_id, resolved.iter().map(|v| v.entity.id)).await?;
    Ok(resolved)
}

/// Replaces the bill of a show. The new bill must not be empty.
pub async fn replace_artists<C>(
    db: &C,
    show_id: i64,
    artists: &[ShowArtistInput],
) -> Result<Vec<(Resolved<artist::Model>, bool)>>
where
    C: ConnectionTrait + TransactionTrait,
{
    if artists.is_empty() {
        return Err(Error::validation("a show needs at least one artist"));
    }
    let resolved = resolve_bill(db, artists).await?;
    ShowArtist::delete_many()
        .filter(show_artist::Column::ShowId.eq(show_id))
        .exec(db)
        .await?;
    link_artists(db, show_id, resolved.iter().map(|(a, h)| (a.entity.id, *h))).await?;
    Ok(resolved)
}

/// Venues linked to a show, in insertion order.
pub async fn venues_for_show<C>(db: &C, show_id: i64) -> Result<Vec<venue::Model>>
where
    C: ConnectionTrait,
{
    let links = ShowVenue::find()
        .filter(show_venue::Column::ShowId.eq(show_id))
        .order_by_asc(show_venue::Column::Position)
        .all(db)
        .await?;
    let mut venues = Vec::with_capacity(links.len());
    for link in links {
        if let Some(v) = Venue::find_by_id(link.venue_id).one(db).await? {
            venues.push(v);
        }
    }
    Ok(venues)
}

/// Billed artists of a show, in billing order.
pub async fn artists_for_show<C>(db: &C, show_id: i64) -> Result<Vec<BilledArtist>>
where
    C: ConnectionTrait,
{
    let links = ShowArtist::find()
        .filter(show_artist::Column::ShowId.eq(show_id))
        .order_by_asc(show_artist::Column::Position)
        .all(db)
        .await?;
    let mut artists = Vec::with_capacity(links.len());
    for link in links {
        if let Some(a) = Artist::find_by_id(link.artist_id).one(db).await? {
            artists.push(BilledArtist {
                artist: a,
                is_headliner: link.is_headliner,
            });
        }
    }
    Ok(artists)
}

/// Loads a show and its relations, failing with `NotFound`.
pub async fn load_show_with_relations<C>(db: &C, show_id: i64) -> Result<ShowWithRelations>
where
    C: ConnectionTrait,
{
    let show = Show::find_by_id(show_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("show", show_id))?;
    Ok(ShowWithRelations {
        venues: venues_for_show(db, show_id).await?,
        artists: artists_for_show(db, show_id).await?,
        show,
    })
}

/// Removes a show and its join rows.
pub async fn delete_show_rows<C>(db: &C, show_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    ShowVenue::delete_many()
        .filter(show_venue::Column::ShowId.eq(show_id))
        .exec(db)
        .await?;
    ShowArtist::delete_many()
        .filter(show_artist::Column::ShowId.eq(show_id))
        .exec(db)
        .await?;
    Show::delete_by_id(show_id).exec(db).await?;
    Ok(())
}
