//! Discovery ingestion - imports events scraped from venue calendars.
//!
//! Scraped data is unverified, so every show created here starts `pending` whoever
//! runs the import. Each event is classified as one of [`DiscoveryOutcome`]; a dry run
//! computes the same classifications without writing anything.
//!
//! Classification order per event:
//! 1. malformed event or unknown venue slug: `Rejected`
//! 2. `(external_id, venue_slug)` already seen earlier in this batch: `Duplicate`
//! 3. key already mapped to a show: `Duplicate`, or `Updated` with `allow_updates`
//! 4. a show with the same or a similar title at that venue that day: `PendingReview`
//! 5. otherwise: `Imported`
//!
//! Anything that fails unexpectedly along the way is `Error`.

use crate::{
    config::limits::BatchLimits,
    core::{
        actor::Actor,
        assembler::{
            ShowArtistInput, ShowDraft, ShowPatch, apply_patch, assemble_show, validate_draft,
            validate_patch,
        },
        markdown::DEFAULT_SHOW_TIME,
        pipeline::Pipeline,
        resolver::{ArtistInput, ArtistRef, VenueRef, find_venue_by_slug, lookup_artist},
        shows::{TitleMatch, compare_titles, find_similar_show},
    },
    entities::{Show, ShowSource, ShowStatus, ShowVenue, show, show_venue, venue},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// An event as delivered by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredEvent {
    /// Scraper's id for the event, unique per venue
    pub external_id: String,
    /// Slug of a venue that must already exist
    pub venue_slug: String,
    /// Event title; also the headliner when `artists` is empty
    pub title: String,
    /// Calendar day of the event
    pub date: NaiveDate,
    /// Door or start time; 8:00 PM when missing
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    /// Bill in order, first is the headliner
    #[serde(default)]
    pub artists: Vec<String>,
    /// Ticket price in dollars
    #[serde(default)]
    pub price: Option<f64>,
    /// Age policy as scraped
    #[serde(default)]
    pub age_restriction: Option<String>,
    /// Ticket link
    #[serde(default)]
    pub ticket_url: Option<String>,
    /// Event blurb
    #[serde(default)]
    pub description: Option<String>,
    /// Sold-out flag
    #[serde(default)]
    pub is_sold_out: bool,
    /// Cancelled flag
    #[serde(default)]
    pub is_cancelled: bool,
}

impl DiscoveredEvent {
    /// The dedup key of this event.
    #[must_use]
    pub fn key(&self) -> EventKey {
        EventKey {
            external_id: self.external_id.trim().to_string(),
            venue_slug: self.venue_slug.trim().to_string(),
        }
    }

    fn starts_at(&self) -> DateTime<Utc> {
        let (h, m) = DEFAULT_SHOW_TIME;
        let time = self
            .start_time
            .or_else(|| NaiveTime::from_hms_opt(h, m, 0))
            .unwrap_or_default();
        self.date.and_time(time).and_utc()
    }

    fn to_draft(&self, venue_id: i64) -> ShowDraft {
        let title = self.title.trim().to_string();
        let names: Vec<&str> = self
            .artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        let names = if names.is_empty() { vec![title.as_str()] } else { names };
        let artists = names
            .iter()
            .enumerate()
            .map(|(i, name)| ShowArtistInput {
                artist: ArtistRef::Described(ArtistInput::named(*name)),
                is_headliner: i == 0,
            })
            .collect();

        ShowDraft {
            event_date: self.starts_at(),
            city: None,
            state: None,
            price: self.price,
            age_requirement: self.age_restriction.clone(),
            description: self.description.clone(),
            ticket_url: self.ticket_url.clone(),
            is_sold_out: self.is_sold_out,
            is_cancelled: self.is_cancelled,
            private: false,
            venues: vec![VenueRef::Existing(venue_id)],
            artists,
            source: ShowSource::Discovery,
            external_id: Some(self.external_id.trim().to_string()),
            title,
        }
    }

    fn update_patch(&self) -> ShowPatch {
        ShowPatch {
            event_date: Some(self.starts_at()),
            price: self.price,
            is_sold_out: Some(self.is_sold_out),
            is_cancelled: Some(self.is_cancelled),
            ..Default::default()
        }
    }
}

/// `(external_id, venue_slug)` pair identifying a scraped event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Scraper's event id
    pub external_id: String,
    /// Venue slug
    pub venue_slug: String,
}

/// Answer to a [`check_events`] key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCheck {
    /// The key that was asked about
    pub key: EventKey,
    /// Whether a show was imported for it
    pub exists: bool,
    /// That show's id
    pub show_id: Option<i64>,
    /// That show's current status
    pub status: Option<ShowStatus>,
}

/// How one discovered event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    /// A new pending show was created
    Imported,
    /// An existing show was refreshed (`allow_updates`)
    Updated,
    /// Already imported, or repeated in the batch
    Duplicate,
    /// Malformed, or the venue slug is unknown
    Rejected,
    /// Looks like a show already listed that day; not imported
    PendingReview,
    /// Failed unexpectedly; the batch carried on
    Error,
}

impl fmt::Display for DiscoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imported => "imported",
            Self::Updated => "updated",
            Self::Duplicate => "duplicate",
            Self::Rejected => "rejected",
            Self::PendingReview => "pending_review",
            Self::Error => "error",
        })
    }
}

/// Per-event line of a [`DiscoveryImportResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDetail {
    /// Position in the submitted batch
    pub index: usize,
    /// Scraper's event id
    pub external_id: String,
    /// Venue slug as submitted
    pub venue_slug: String,
    /// Classification
    pub outcome: DiscoveryOutcome,
    /// Created, updated or matched show; `None` in dry runs for new shows
    pub show_id: Option<i64>,
    /// Why the event was not simply imported
    pub message: Option<String>,
}

/// Summary of an [`import_events`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryImportResult {
    /// Events submitted
    pub total: usize,
    /// Events imported as new shows
    pub imported: usize,
    /// Existing shows refreshed
    pub updated: usize,
    /// Events already known
    pub duplicates: usize,
    /// Malformed events
    pub rejected: usize,
    /// Probable duplicates held back
    pub pending_review: usize,
    /// Events that failed
    pub errors: usize,
    /// Whether anything was written
    pub dry_run: bool,
    /// One line per event, in batch order
    pub details: Vec<DiscoveryDetail>,
}

impl DiscoveryImportResult {
    fn record(&mut self, detail: DiscoveryDetail) {
        match detail.outcome {
            DiscoveryOutcome::Imported => self.imported += 1,
            DiscoveryOutcome::Updated => self.updated += 1,
            DiscoveryOutcome::Duplicate => self.duplicates += 1,
            DiscoveryOutcome::Rejected => self.rejected += 1,
            DiscoveryOutcome::PendingReview => self.pending_review += 1,
            DiscoveryOutcome::Error => self.errors += 1,
        }
        self.details.push(detail);
    }
}

/// Show already imported for `external_id` at `venue_id`.
async fn find_show_by_key<C>(db: &C, external_id: &str, venue_id: i64) -> Result<Option<show::Model>>
where
    C: ConnectionTrait,
{
    Show::find()
        .inner_join(ShowVenue)
        .filter(show_venue::Column::VenueId.eq(venue_id))
        .filter(show::Column::ExternalId.eq(external_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// `CheckEvents` - pure lookups telling the scraper which events are already known.
pub async fn check_events(
    pipeline: &Pipeline,
    actor: &Actor,
    keys: &[EventKey],
) -> Result<Vec<EventCheck>> {
    actor.require_admin()?;
    BatchLimits::check("event check", keys.len(), pipeline.limits.max_discovery_check)?;

    let db = &pipeline.database;
    let mut checks = Vec::with_capacity(keys.len());
    for key in keys {
        let found = match find_venue_by_slug(db, key.venue_slug.trim()).await? {
            Some(v) => find_show_by_key(db, key.external_id.trim(), v.id).await?,
            None => None,
        };
        checks.push(EventCheck {
            key: key.clone(),
            exists: found.is_some(),
            show_id: found.as_ref().map(|s| s.id),
            status: found.map(|s| s.status),
        });
    }
    debug!(checked = checks.len(), "Discovery keys checked");
    Ok(checks)
}

/// Batch-wide state that makes dry and real runs classify identically.
#[derive(Default)]
struct BatchState {
    seen: HashSet<EventKey>,
    /// `(venue_id, date, title)` of shows this batch imports
    planned: Vec<(i64, NaiveDate, String)>,
}

impl BatchState {
    fn planned_match(&self, venue_id: i64, date: NaiveDate, title: &str) -> Option<TitleMatch> {
        self.planned
            .iter()
            .filter(|(v, d, _)| *v == venue_id && *d == date)
            .find_map(|(_, _, t)| compare_titles(t, title))
    }
}

fn detail(
    index: usize,
    event: &DiscoveredEvent,
    outcome: DiscoveryOutcome,
    show_id: Option<i64>,
    message: Option<String>,
) -> DiscoveryDetail {
    DiscoveryDetail {
        index,
        external_id: event.external_id.clone(),
        venue_slug: event.venue_slug.clone(),
        outcome,
        show_id,
        message,
    }
}

fn validate_event(event: &DiscoveredEvent) -> Result<()> {
    if event.external_id.trim().is_empty() {
        return Err(Error::validation("event has no external_id"));
    }
    if event.venue_slug.trim().is_empty() {
        return Err(Error::validation("event has no venue_slug"));
    }
    if event.title.trim().is_empty() {
        return Err(Error::validation("event has no title"));
    }
    Ok(())
}

async fn process_event(
    pipeline: &Pipeline,
    actor: &Actor,
    state: &mut BatchState,
    index: usize,
    event: &DiscoveredEvent,
    dry_run: bool,
    allow_updates: bool,
) -> Result<DiscoveryDetail> {
    let db = &pipeline.database;
    if let Err(err) = validate_event(event) {
        return Ok(detail(index, event, DiscoveryOutcome::Rejected, None, Some(err.to_string())));
    }

    let Some(venue) = find_venue_by_slug(db, event.venue_slug.trim()).await? else {
        return Ok(detail(
            index,
            event,
            DiscoveryOutcome::Rejected,
            None,
            Some(format!("unknown venue slug {:?}", event.venue_slug)),
        ));
    };

    if !state.seen.insert(event.key()) {
        return Ok(detail(
            index,
            event,
            DiscoveryOutcome::Duplicate,
            None,
            Some("repeated earlier in this batch".to_string()),
        ));
    }

    if let Some(existing) = find_show_by_key(db, event.external_id.trim(), venue.id).await? {
        if !allow_updates {
            return Ok(detail(index, event, DiscoveryOutcome::Duplicate, Some(existing.id), None));
        }
        let patch = event.update_patch();
        validate_patch(&patch)?;
        if !dry_run {
            let txn = db.begin().await?;
            apply_patch(&txn, existing.clone(), &patch).await?;
            txn.commit().await?;
            info!(show_id = existing.id, external_id = %event.external_id, "Discovered show updated");
        }
        return Ok(detail(index, event, DiscoveryOutcome::Updated, Some(existing.id), None));
    }

    if let Some(similar) = near_duplicate(db, state, &venue, event).await? {
        return Ok(detail(
            index,
            event,
            DiscoveryOutcome::PendingReview,
            similar.0,
            Some(similar.1),
        ));
    }

    let draft = event.to_draft(venue.id);
    let show_id = if dry_run {
        validate_draft(&draft)?;
        for a in &draft.artists {
            lookup_artist(db, &a.artist).await?;
        }
        None
    } else {
        let txn = db.begin().await?;
        let assembled = assemble_show(&txn, actor, &draft, Some(ShowStatus::Pending)).await?;
        txn.commit().await?;
        pipeline.emit(assembled.events());
        Some(assembled.show.id)
    };
    state
        .planned
        .push((venue.id, event.date, event.title.trim().to_string()));
    Ok(detail(index, event, DiscoveryOutcome::Imported, show_id, None))
}

async fn near_duplicate(
    db: &DatabaseConnection,
    state: &BatchState,
    venue: &venue::Model,
    event: &DiscoveredEvent,
) -> Result<Option<(Option<i64>, String)>> {
    if state
        .planned_match(venue.id, event.date, &event.title)
        .is_some()
    {
        return Ok(Some((
            None,
            "similar title already imported in this batch".to_string(),
        )));
    }
    Ok(find_similar_show(db, venue.id, event.date, &event.title)
        .await?
        .map(|(show, _)| {
            (
                Some(show.id),
                format!("similar to existing show {:?} at {}", show.title, venue.name),
            )
        }))
}

/// `ImportEvents` - classifies and (unless `dry_run`) imports a batch of events.
///
/// The cap is enforced before anything runs. Events are processed in order, each to
/// completion; a failure is recorded against its event and the batch carries on.
#[instrument(skip(pipeline, actor, events), fields(actor = ?actor.user_id, events = events.len()))]
pub async fn import_events(
    pipeline: &Pipeline,
    actor: &Actor,
    events: &[DiscoveredEvent],
    dry_run: bool,
    allow_updates: bool,
) -> Result<DiscoveryImportResult> {
    actor.require_admin()?;
    BatchLimits::check("event import", events.len(), pipeline.limits.max_discovery_import)?;

    let mut state = BatchState::default();
    let mut result = DiscoveryImportResult {
        total: events.len(),
        dry_run,
        ..Default::default()
    };

    for (index, event) in events.iter().enumerate() {
        let line = match process_event(pipeline, actor, &mut state, index, event, dry_run, allow_updates)
            .await
        {
            Ok(line) => line,
            Err(err) => {
                warn!(index, external_id = %event.external_id, error = %err, "Discovery event failed");
                detail(index, event, DiscoveryOutcome::Error, None, Some(err.to_string()))
            }
        };
        debug!(index, outcome = %line.outcome, "Discovery event classified");
        result.record(line);
    }

    info!(
        dry_run,
        imported = result.imported,
        updated = result.updated,
        duplicates = result.duplicates,
        rejected = result.rejected,
        pending_review = result.pending_review,
        errors = result.errors,
        "Discovery import finished"
    );
    Ok(result)
}
