//! Pending venue edit queue.
//!
//! Venues are shared data, so a non-admin cannot rewrite one directly. Their proposal is
//! parked as a [`pending_venue_edit`] row holding the JSON diff. At most one pending
//! proposal exists per `(venue, user)`; the check runs in the transaction and the
//! partial unique index catches the race the check cannot.
//!
//! - approve: diff applied, row deleted
//! - reject: row kept as `rejected` with the reason, for audit
//! - cancel: proposer withdraws, row deleted

use crate::{
    core::{
        actor::Actor,
        events::PipelineEvent,
        pipeline::Pipeline,
        venues::{VenueChanges, apply_changes},
    },
    entities::{EditStatus, PendingVenueEdit, Venue, pending_venue_edit, venue},
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde_json::json;
use tracing::{info, warn};

/// What happened to a proposed edit.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueEditOutcome {
    /// Admin edit, written straight to the venue
    Applied(venue::Model),
    /// Parked for review
    Queued(pending_venue_edit::Model),
}

impl pending_venue_edit::Model {
    /// Decodes the stored diff.
    pub fn changes(&self) -> Result<VenueChanges> {
        serde_json::from_value(self.proposed_changes.clone()).map_err(Into::into)
    }
}

async fn load_edit<C>(db: &C, edit_id: i64) -> Result<pending_venue_edit::Model>
where
    C: ConnectionTrait,
{
    PendingVenueEdit::find_by_id(edit_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("venue edit", edit_id))
}

fn ensure_pending(edit: &pending_venue_edit::Model) -> Result<()> {
    if edit.status == EditStatus::Pending {
        Ok(())
    } else {
        Err(Error::conflict(format!(
            "venue edit {} has already been reviewed",
            edit.id
        )))
    }
}

/// The active proposal of `user_id` for `venue_id`, if any.
pub async fn get_pending_edit_for_user<C>(
    db: &C,
    venue_id: i64,
    user_id: i64,
) -> Result<Option<pending_venue_edit::Model>>
where
    C: ConnectionTrait,
{
    PendingVenueEdit::find()
        .filter(pending_venue_edit::Column::VenueId.eq(venue_id))
        .filter(pending_venue_edit::Column::ProposedBy.eq(user_id))
        .filter(pending_venue_edit::Column::Status.eq(EditStatus::Pending))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All proposals awaiting review, oldest first.
pub async fn list_pending_venue_edits(
    db: &DatabaseConnection,
) -> Result<Vec<pending_venue_edit::Model>> {
    PendingVenueEdit::find()
        .filter(pending_venue_edit::Column::Status.eq(EditStatus::Pending))
        .order_by_asc(pending_venue_edit::Column::CreatedAt)
        .order_by_asc(pending_venue_edit::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// `CreatePendingVenueEdit`.
///
/// Admins bypass the queue and get [`VenueEditOutcome::Applied`]. Anyone else gets a
/// queued edit, or `Conflict` if they already have one pending for this venue.
pub async fn propose_venue_edit(
    pipeline: &Pipeline,
    actor: &Actor,
    venue_id: i64,
    changes: &VenueChanges,
) -> Result<VenueEditOutcome> {
    let user_id = actor.id()?;
    changes.validate()?;

    let txn = pipeline.database.begin().await?;
    let current = Venue::find_by_id(venue_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("venue", venue_id))?;

    if actor.is_admin {
        let updated = apply_changes(&txn, current, changes).await?;
        txn.commit().await?;
        info!(venue_id, user_id, "Admin venue edit applied directly");
        pipeline.emit(vec![PipelineEvent::audit(
            user_id,
            "update_venue",
            "venue",
            venue_id,
            serde_json::to_value(changes)?,
        )]);
        return Ok(VenueEditOutcome::Applied(updated));
    }

    if get_pending_edit_for_user(&txn, venue_id, user_id)
        .await?
        .is_some()
    {
        return Err(Error::conflict(
            "you already have a pending edit for this venue",
        ));
    }

    let now = chrono::Utc::now();
    let inserted = pending_venue_edit::ActiveModel {
        venue_id: Set(venue_id),
        proposed_by: Set(user_id),
        proposed_changes: Set(serde_json::to_value(changes)?),
        status: Set(EditStatus::Pending),
        reviewed_by: Set(None),
        reviewed_at: Set(None),
        rejection_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await;

    let edit = match inserted {
        Ok(edit) => edit,
        Err(err) if is_unique_violation(&err) => {
            warn!(venue_id, user_id, "Concurrent duplicate venue edit refused");
            return Err(Error::conflict(
                "you already have a pending edit for this venue",
            ));
        }
        Err(err) => return Err(err.into()),
    };
    txn.commit().await?;

    info!(edit_id = edit.id, venue_id, user_id, "Venue edit queued");
    pipeline.emit(vec![PipelineEvent::PendingVenueEditCreated {
        edit_id: edit.id,
        venue_id,
        proposed_by: user_id,
    }]);
    Ok(VenueEditOutcome::Queued(edit))
}

/// `ApproveVenueEdit` - admin only. Applies the diff and removes the edit row.
pub async fn approve_venue_edit(
    pipeline: &Pipeline,
    actor: &Actor,
    edit_id: i64,
) -> Result<venue::Model> {
    let reviewer_id = actor.require_admin()?;
    let txn = pipeline.database.begin().await?;

    let edit = load_edit(&txn, edit_id).await?;
    ensure_pending(&edit)?;
    let changes = edit.changes()?;
    let current = Venue::find_by_id(edit.venue_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("venue", edit.venue_id))?;

    let updated = apply_changes(&txn, current, &changes).await?;
    let venue_id = edit.venue_id;
    let proposed_by = edit.proposed_by;
    edit.delete(&txn).await?;
    txn.commit().await?;

    info!(edit_id, venue_id, reviewer_id, "Venue edit approved");
    pipeline.emit(vec![
        PipelineEvent::VenueEditReviewed {
            edit_id,
            venue_id,
            approved: true,
        },
        PipelineEvent::audit(
            reviewer_id,
            "approve_venue_edit",
            "venue_edit",
            edit_id,
            json!({ "venue_id": venue_id, "proposed_by": proposed_by, "changes": changes }),
        ),
    ]);
    Ok(updated)
}

/// `RejectVenueEdit` - admin only. The row stays, marked rejected.
pub async fn reject_venue_edit(
    pipeline: &Pipeline,
    actor: &Actor,
    edit_id: i64,
    reason: &str,
) -> Result<pending_venue_edit::Model> {
    let reviewer_id = actor.require_admin()?;
    if reason.trim().is_empty() {
        return Err(Error::validation("a rejection reason is required"));
    }

    let txn = pipeline.database.begin().await?;
    let edit = load_edit(&txn, edit_id).await?;
    ensure_pending(&edit)?;

    let venue_id = edit.venue_id;
    let now = chrono::Utc::now();
    let mut active: pending_venue_edit::ActiveModel = edit.into();
    active.status = Set(EditStatus::Rejected);
    active.reviewed_by = Set(Some(reviewer_id));
    active.reviewed_at = Set(Some(now));
    active.rejection_reason = Set(Some(reason.trim().to_string()));
    active.updated_at = Set(now);
    let rejected = active.update(&txn).await?;
    txn.commit().await?;

    info!(edit_id, venue_id, reviewer_id, "Venue edit rejected");
    pipeline.emit(vec![
        PipelineEvent::VenueEditReviewed {
            edit_id,
            venue_id,
            approved: false,
        },
        PipelineEvent::audit(
            reviewer_id,
            "reject_venue_edit",
            "venue_edit",
            edit_id,
            json!({ "venue_id": venue_id, "reason": reason.trim() }),
        ),
    ]);
    Ok(rejected)
}

/// `CancelPendingVenueEdit` - the proposer withdraws an unreviewed edit.
pub async fn cancel_venue_edit(pipeline: &Pipeline, actor: &Actor, edit_id: i64) -> Result<()> {
    let user_id = actor.id()?;
    let txn = pipeline.database.begin().await?;

    let edit = load_edit(&txn, edit_id).await?;
    if edit.proposed_by != user_id {
        return Err(Error::forbidden("only the proposer can cancel a venue edit"));
    }
    ensure_pending(&edit)?;

    edit.delete(&txn).await?;
    txn.commit().await?;
    info!(edit_id, user_id, "Venue edit cancelled");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn address_change(address: &str) -> VenueChanges {
        VenueChanges {
            address: Some(address.to_string()),
            ..Default::default()
        }
    }

    fn queued(outcome: VenueEditOutcome) -> pending_venue_edit::Model {
        match outcome {
            VenueEditOutcome::Queued(edit) => edit,
            VenueEditOutcome::Applied(v) => panic!("expected queued edit, got applied {v:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_active_edit_per_user() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;

        let first = queued(
            propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("130 N Central"))
                .await?,
        );
        assert_eq!(first.status, EditStatus::Pending);

        let second =
            propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("other")).await;
        assert!(matches!(second, Err(Error::Conflict { .. })));

        // A different user may still propose.
        propose_venue_edit(&pipeline, &member(5), venue.id, &address_change("third")).await?;

        // After rejection the pair is free again.
        reject_venue_edit(&pipeline, &admin(), first.id, "wrong address").await?;
        propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("retry")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_applies_diff_and_deletes_row() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;
        let edit = queued(
            propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("130 N Central"))
                .await?,
        );

        let denied = approve_venue_edit(&pipeline, &member(4), edit.id).await;
        assert!(matches!(denied, Err(Error::Forbidden { .. })));

        let updated = approve_venue_edit(&pipeline, &admin(), edit.id).await?;
        assert_eq!(updated.address.as_deref(), Some("130 N Central"));
        assert_eq!(updated.name, "Valley Bar");
        assert!(
            PendingVenueEdit::find_by_id(edit.id)
                .one(&pipeline.database)
                .await?
                .is_none()
        );
        assert!(
            sink.audit_entries()
                .iter()
                .any(|a| a.action == "approve_venue_edit")
        );

        // Pair is free after approval.
        propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("again")).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_edit_is_kept_but_not_actionable() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;
        let edit = queued(
            propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("x")).await?,
        );

        let rejected = reject_venue_edit(&pipeline, &admin(), edit.id, "not a real address").await?;
        assert_eq!(rejected.status, EditStatus::Rejected);
        assert_eq!(rejected.reviewed_by, Some(1));
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not a real address"));

        let again = approve_venue_edit(&pipeline, &admin(), edit.id).await;
        assert!(matches!(again, Err(Error::Conflict { .. })));
        let cancel = cancel_venue_edit(&pipeline, &member(4), edit.id).await;
        assert!(matches!(cancel, Err(Error::Conflict { .. })));

        let stored = load_edit(&pipeline.database, edit.id).await?;
        assert_eq!(stored.status, EditStatus::Rejected);
        assert!(list_pending_venue_edits(&pipeline.database).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_only_by_proposer() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;
        let edit = queued(
            propose_venue_edit(&pipeline, &member(4), venue.id, &address_change("x")).await?,
        );

        let denied = cancel_venue_edit(&pipeline, &member(9), edit.id).await;
        assert!(matches!(denied, Err(Error::Forbidden { .. })));

        cancel_venue_edit(&pipeline, &member(4), edit.id).await?;
        assert!(
            get_pending_edit_for_user(&pipeline.database, venue.id, 4)
                .await?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_edit_bypasses_queue() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;

        let outcome =
            propose_venue_edit(&pipeline, &admin(), venue.id, &address_change("direct")).await?;
        assert!(matches!(outcome, VenueEditOutcome::Applied(ref v) if v.address.as_deref() == Some("direct")));
        assert!(list_pending_venue_edits(&pipeline.database).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_diff_round_trips() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", true).await?;
        let changes = VenueChanges {
            name: Some("Valley Bar PHX".to_string()),
            zipcode: Some("85004".to_string()),
            ..Default::default()
        };
        let edit = queued(propose_venue_edit(&pipeline, &member(4), venue.id, &changes).await?);
        assert_eq!(edit.changes()?, changes);
        Ok(())
    }
}
