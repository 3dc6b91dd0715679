//! Show CRUD operations: creation, edits, flags and deletion.
//!
//! Status changes live in [`crate::core::lifecycle`]; nothing here moves a show between
//! states.

use crate::{
    core::{
        actor::Actor,
        assembler::{
            ShowArtistInput, ShowDraft, ShowPatch, ShowWithRelations, apply_patch, assemble_show,
            delete_show_rows, load_show_with_relations, replace_artists, replace_venues,
        },
        events::PipelineEvent,
        pipeline::Pipeline,
        resolver::VenueRef,
    },
    entities::{Show, ShowStatus, ShowVenue, show, show_venue},
    errors::{Error, Result},
};
use chrono::{NaiveDate, TimeDelta};
use sea_orm::{QueryOrder, QuerySelect, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

/// `UpdateShow(withRelations)` payload.
///
/// `venues` and `artists`, when present, replace the whole list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowUpdate {
    /// Field changes
    #[serde(flatten)]
    pub patch: ShowPatch,
    /// Replacement venue list
    pub venues: Option<Vec<VenueRef>>,
    /// Replacement bill
    pub artists: Option<Vec<ShowArtistInput>>,
}

impl ShowUpdate {
    /// True when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.venues.is_none() && self.artists.is_none()
    }
}

async fn load_show<C>(db: &C, show_id: i64) -> Result<show::Model>
where
    C: ConnectionTrait,
{
    Show::find_by_id(show_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("show", show_id))
}

/// `CreateShow` - builds a show from a direct submission.
#[instrument(skip(pipeline, actor, draft), fields(actor = ?actor.user_id, title = %draft.title))]
pub async fn create_show(
    pipeline: &Pipeline,
    actor: &Actor,
    draft: ShowDraft,
) -> Result<ShowWithRelations> {
    actor.id()?;
    let txn = pipeline.database.begin().await?;
    let assembled = assemble_show(&txn, actor, &draft, None).await?;
    txn.commit().await?;

    info!(show_id = assembled.show.id, status = %assembled.show.status, "Show created");
    pipeline.emit(assembled.events());
    Ok(assembled.to_relations())
}

/// `UpdateShow(withRelations)` - owner or admin.
///
/// Status is left as it is, so an approved show edited by its submitter stays
/// approved.
#[instrument(skip(pipeline, actor, update), fields(actor = ?actor.user_id))]
pub async fn update_show(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    update: &ShowUpdate,
) -> Result<ShowWithRelations> {
    actor.id()?;
    if update.is_empty() {
        return Err(Error::validation("no show changes supplied"));
    }

    let txn = pipeline.database.begin().await?;
    let current = load_show(&txn, show_id).await?;
    let actor_id = actor.require_owner_or_admin(current.submitted_by)?;

    let mut events = Vec::new();
    if !update.patch.is_empty() {
        apply_patch(&txn, current, &update.patch).await?;
    }
    if let Some(venues) = &update.venues {
        for v in replace_venues(&txn, show_id, venues, actor).await? {
            if v.was_created {
                events.push(PipelineEvent::VenueCreated {
                    venue_id: v.entity.id,
                    name: v.entity.name.clone(),
                    verified: v.entity.verified,
                });
            }
        }
    }
    if let Some(artists) = &update.artists {
        for (a, _) in replace_artists(&txn, show_id, artists).await? {
            if a.was_created {
                events.push(PipelineEvent::ArtistCreated {
                    artist_id: a.entity.id,
                    name: a.entity.name.clone(),
                });
            }
        }
    }

    let updated = load_show_with_relations(&txn, show_id).await?;
    txn.commit().await?;

    info!(show_id, actor_id, "Show updated");
    pipeline.emit(events);
    Ok(updated)
}

/// `DeleteShow` - hard delete by owner or admin.
pub async fn delete_show(pipeline: &Pipeline, actor: &Actor, show_id: i64) -> Result<()> {
    let txn = pipeline.database.begin().await?;
    let current = load_show(&txn, show_id).await?;
    let actor_id = actor.require_owner_or_admin(current.submitted_by)?;

    delete_show_rows(&txn, show_id).await?;
    txn.commit().await?;

    info!(show_id, actor_id, "Show deleted");
    if actor.is_admin && actor_id != current.submitted_by {
        pipeline.emit(vec![PipelineEvent::audit(
            actor_id,
            "delete_show",
            "show",
            show_id,
            json!({ "title": current.title }),
        )]);
    }
    Ok(())
}

async fn set_flag(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    patch: ShowPatch,
) -> Result<show::Model> {
    let txn = pipeline.database.begin().await?;
    let current = load_show(&txn, show_id).await?;
    actor.require_owner_or_admin(current.submitted_by)?;
    let updated = apply_patch(&txn, current, &patch).await?;
    txn.commit().await?;
    Ok(updated)
}

/// `SetShowSoldOut` - owner or admin. Independent of status.
pub async fn set_show_sold_out(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    sold_out: bool,
) -> Result<show::Model> {
    let patch = ShowPatch {
        is_sold_out: Some(sold_out),
        ..Default::default()
    };
    let updated = set_flag(pipeline, actor, show_id, patch).await?;
    info!(show_id, sold_out, "Show sold-out flag set");
    Ok(updated)
}

/// `SetShowCancelled` - owner or admin. Independent of status.
pub async fn set_show_cancelled(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    cancelled: bool,
) -> Result<show::Model> {
    let patch = ShowPatch {
        is_cancelled: Some(cancelled),
        ..Default::default()
    };
    let updated = set_flag(pipeline, actor, show_id, patch).await?;
    info!(show_id, cancelled, "Show cancelled flag set");
    Ok(updated)
}

/// Finds a show by id.
pub async fn get_show(db: &DatabaseConnection, show_id: i64) -> Result<Option<show::Model>> {
    Show::find_by_id(show_id).one(db).await.map_err(Into::into)
}

/// A show with its venues and bill, or `NotFound`.
pub async fn get_show_with_relations(
    db: &DatabaseConnection,
    show_id: i64,
) -> Result<ShowWithRelations> {
    load_show_with_relations(db, show_id).await
}

/// Shows in `status`, soonest first.
pub async fn list_shows_by_status(
    db: &DatabaseConnection,
    status: ShowStatus,
) -> Result<Vec<show::Model>> {
    Show::find()
        .filter(show::Column::Status.eq(status))
        .order_by_asc(show::Column::EventDate)
        .order_by_asc(show::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// How closely two show titles agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleMatch {
    /// Same words after normalisation
    Same,
    /// The words of one title appear, in order and adjacent, in the other
    Similar,
}

fn title_words(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_words(haystack: &[String], needle: &[String]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Compares two titles ignoring case and punctuation.
#[must_use]
pub fn compare_titles(a: &str, b: &str) -> Option<TitleMatch> {
    let (a, b) = (title_words(a), title_words(b));
    if a.is_empty() || b.is_empty() {
        None
    } else if a == b {
        Some(TitleMatch::Same)
    } else if contains_words(&a, &b) || contains_words(&b, &a) {
        Some(TitleMatch::Similar)
    } else {
        None
    }
}

/// Shows linked to `venue_id` on the calendar day `date` (UTC).
pub async fn shows_at_venue_on<C>(db: &C, venue_id: i64, date: NaiveDate) -> Result<Vec<show::Model>>
where
    C: ConnectionTrait,
{
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = start + TimeDelta::days(1);
    Show::find()
        .inner_join(ShowVenue)
        .filter(show_venue::Column::VenueId.eq(venue_id))
        .filter(show::Column::EventDate.gte(start))
        .filter(show::Column::EventDate.lt(end))
        .distinct()
        .all(db)
        .await
        .map_err(Into::into)
}

/// The closest existing show at the venue that day, if any title matches.
pub async fn find_similar_show<C>(
    db: &C,
    venue_id: i64,
    date: NaiveDate,
    title: &str,
) -> Result<Option<(show::Model, TitleMatch)>>
where
    C: ConnectionTrait,
{
    let mut best: Option<(show::Model, TitleMatch)> = None;
    for candidate in shows_at_venue_on(db, venue_id, date).await? {
        match compare_titles(&candidate.title, title) {
            Some(TitleMatch::Same) => return Ok(Some((candidate, TitleMatch::Same))),
            Some(TitleMatch::Similar) if best.is_none() => {
                best = Some((candidate, TitleMatch::Similar));
            }
            _ => {}
        }
    }
    Ok(best)
}
