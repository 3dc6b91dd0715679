//! Show lifecycle - the status state machine and the moderation actions that drive it.
//!
//! Every legal move is one row of [`TRANSITIONS`], keyed by `(current status, action)`
//! and carrying the target, the permission required and the side effect. All entry
//! points go through [`apply_action`], so the rules live in exactly one place.
//!
//! | From     | Action       | To                                          |
//! |----------|--------------|---------------------------------------------|
//! | pending  | approve      | approved (optionally verifying venues)      |
//! | pending  | reject       | rejected (reason stored)                    |
//! | pending  | make-private | private                                     |
//! | private  | publish      | approved if all venues verified, else pending |
//! | approved | unpublish    | pending                                     |

use crate::{
    core::{
        actor::Actor, assembler::venues_for_show, events::PipelineEvent, pipeline::Pipeline,
        venues::verify_unverified,
    },
    entities::{Show, ShowStatus, show},
    errors::{Error, Result},
};
use sea_orm::{Set, TransactionTrait, prelude::*};
use serde_json::json;
use std::fmt;
use tracing::{info, instrument};

/// A requested lifecycle action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowAction {
    /// Admin approval, optionally verifying every unverified venue on the show
    Approve {
        /// Also mark the show's unverified venues verified
        verify_venues: bool,
    },
    /// Admin rejection with a mandatory reason
    Reject {
        /// Shown to the submitter; may not be blank
        reason: String,
    },
    /// Owner hides a pending show
    MakePrivate,
    /// Owner submits a private show for listing
    Publish,
    /// Owner pulls an approved show back to pending
    Unpublish,
}

/// Action without its payload, used as the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// See [`ShowAction::Approve`]
    Approve,
    /// See [`ShowAction::Reject`]
    Reject,
    /// See [`ShowAction::MakePrivate`]
    MakePrivate,
    /// See [`ShowAction::Publish`]
    Publish,
    /// See [`ShowAction::Unpublish`]
    Unpublish,
}

impl ActionKind {
    /// Every action kind, for exhaustive checks.
    pub const ALL: [Self; 5] = [
        Self::Approve,
        Self::Reject,
        Self::MakePrivate,
        Self::Publish,
        Self::Unpublish,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::MakePrivate => "make private",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
        }
    }

    /// Who may request this action at all.
    #[must_use]
    pub const fn permission(self) -> Permission {
        match self {
            Self::Approve | Self::Reject => Permission::AdminOnly,
            Self::MakePrivate | Self::Publish | Self::Unpublish => Permission::OwnerOrAdmin,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShowAction {
    /// The table key for this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Approve { .. } => ActionKind::Approve,
            Self::Reject { .. } => ActionKind::Reject,
            Self::MakePrivate => ActionKind::MakePrivate,
            Self::Publish => ActionKind::Publish,
            Self::Unpublish => ActionKind::Unpublish,
        }
    }
}

/// Who may perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Any admin
    AdminOnly,
    /// The submitter or any admin
    OwnerOrAdmin,
}

/// Where a transition lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Always this status
    Fixed(ShowStatus),
    /// `approved` when every venue is verified, otherwise `pending`
    ApprovedIfVenuesVerified,
}

/// What else happens when a transition fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Status change only
    None,
    /// Verify unverified venues when the approval asked for it
    CascadeVerifyVenues,
    /// Store the reason on the show
    RecordRejectionReason,
}

/// One legal edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status the show must be in
    pub from: ShowStatus,
    /// Requested action
    pub action: ActionKind,
    /// Resulting status
    pub target: Target,
    /// Extra work done in the same transaction
    pub effect: SideEffect,
}

/// The complete set of legal edges. Anything not listed is refused.
pub const TRANSITIONS: [Transition; 5] = [
    Transition {
        from: ShowStatus::Pending,
        action: ActionKind::Approve,
        target: Target::Fixed(ShowStatus::Approved),
        effect: SideEffect::CascadeVerifyVenues,
    },
    Transition {
        from: ShowStatus::Pending,
        action: ActionKind::Reject,
        target: Target::Fixed(ShowStatus::Rejected),
        effect: SideEffect::RecordRejectionReason,
    },
    Transition {
        from: ShowStatus::Pending,
        action: ActionKind::MakePrivate,
        target: Target::Fixed(ShowStatus::Private),
        effect: SideEffect::None,
    },
    Transition {
        from: ShowStatus::Private,
        action: ActionKind::Publish,
        target: Target::ApprovedIfVenuesVerified,
        effect: SideEffect::None,
    },
    Transition {
        from: ShowStatus::Approved,
        action: ActionKind::Unpublish,
        target: Target::Fixed(ShowStatus::Pending),
        effect: SideEffect::None,
    },
];

/// Finds the edge for `(from, action)`, if it is legal.
#[must_use]
pub fn find_transition(from: ShowStatus, action: ActionKind) -> Option<&'static Transition> {
    TRANSITIONS
        .iter()
        .find(|t| t.from == from && t.action == action)
}

/// Status a freshly created show starts in.
///
/// Private requests win; otherwise an admin whose venues are all verified publishes
/// directly and everyone else waits for review.
#[must_use]
pub const fn initial_status(
    requested_private: bool,
    is_admin: bool,
    all_venues_verified: bool,
) -> ShowStatus {
    if requested_private {
        ShowStatus::Private
    } else if is_admin && all_venues_verified {
        ShowStatus::Approved
    } else {
        ShowStatus::Pending
    }
}

fn authorize(actor: &Actor, show: &show::Model, kind: ActionKind) -> Result<i64> {
    match kind.permission() {
        Permission::AdminOnly => actor.require_admin(),
        Permission::OwnerOrAdmin => actor.require_owner_or_admin(show.submitted_by),
    }
}

/// Runs a lifecycle action against a show inside one transaction.
///
/// Checks run in order: identity, show exists, permission, legal edge. On success the
/// status change and any side effect are committed together and the matching events
/// published afterwards.
#[instrument(skip(pipeline, actor), fields(actor = ?actor.user_id))]
pub async fn apply_action(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    action: ShowAction,
) -> Result<show::Model> {
    let actor_id = actor.id()?;
    if let ShowAction::Reject { reason } = &action {
        if reason.trim().is_empty() {
            return Err(Error::validation("a rejection reason is required"));
        }
    }

    let kind = action.kind();
    let txn = pipeline.database.begin().await?;

    let current = Show::find_by_id(show_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("show", show_id))?;
    authorize(actor, &current, kind)?;

    let transition =
        find_transition(current.status, kind).ok_or_else(|| Error::InvalidTransition {
            from: current.status.to_string(),
            action: kind.to_string(),
        })?;

    let mut events = Vec::new();
    let target = match transition.target {
        Target::Fixed(status) => status,
        Target::ApprovedIfVenuesVerified => {
            let venues = venues_for_show(&txn, show_id).await?;
            if venues.iter().all(|v| v.verified) {
                ShowStatus::Approved
            } else {
                ShowStatus::Pending
            }
        }
    };

    let mut active: show::ActiveModel = current.clone().into();
    match (transition.effect, &action) {
        (SideEffect::CascadeVerifyVenues, ShowAction::Approve { verify_venues: true }) => {
            let venue_ids: Vec<i64> = venues_for_show(&txn, show_id)
                .await?
                .into_iter()
                .map(|v| v.id)
                .collect();
            for verified in verify_unverified(&txn, &venue_ids).await? {
                events.push(PipelineEvent::VenueVerified {
                    venue_id: verified.id,
                    name: verified.name.clone(),
                });
                events.push(PipelineEvent::audit(
                    actor_id,
                    "verify_venue",
                    "venue",
                    verified.id,
                    json!({ "cascade_from_show": show_id }),
                ));
            }
        }
        (SideEffect::RecordRejectionReason, ShowAction::Reject { reason }) => {
            active.rejection_reason = Set(Some(reason.trim().to_string()));
        }
        _ => {}
    }

    active.status = Set(target);
    active.updated_at = Set(chrono::Utc::now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!(show_id, from = %current.status, to = %updated.status, action = %kind, "Show status changed");

    match &action {
        ShowAction::Approve { verify_venues } => {
            events.push(PipelineEvent::ShowApproved {
                show_id,
                title: updated.title.clone(),
                submitted_by: updated.submitted_by,
            });
            events.push(PipelineEvent::audit(
                actor_id,
                "approve_show",
                "show",
                show_id,
                json!({ "verify_venues": verify_venues }),
            ));
        }
        ShowAction::Reject { reason } => {
            events.push(PipelineEvent::ShowRejected {
                show_id,
                title: updated.title.clone(),
                submitted_by: updated.submitted_by,
                reason: reason.trim().to_string(),
            });
            events.push(PipelineEvent::audit(
                actor_id,
                "reject_show",
                "show",
                show_id,
                json!({ "reason": reason.trim() }),
            ));
        }
        ShowAction::MakePrivate | ShowAction::Publish | ShowAction::Unpublish => {}
    }
    pipeline.emit(events);

    Ok(updated)
}

/// `ApproveShow(verifyVenues)` - admin only, `pending` -> `approved`.
pub async fn approve_show(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    verify_venues: bool,
) -> Result<show::Model> {
    apply_action(pipeline, actor, show_id, ShowAction::Approve { verify_venues }).await
}

/// `RejectShow(reason)` - admin only, `pending` -> `rejected`.
pub async fn reject_show(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
    reason: &str,
) -> Result<show::Model> {
    apply_action(
        pipeline,
        actor,
        show_id,
        ShowAction::Reject {
            reason: reason.to_string(),
        },
    )
    .await
}

/// `PublishShow` - owner or admin, `private` -> `approved`/`pending`.
pub async fn publish_show(pipeline: &Pipeline, actor: &Actor, show_id: i64) -> Result<show::Model> {
    apply_action(pipeline, actor, show_id, ShowAction::Publish).await
}

/// `UnpublishShow` - owner or admin, `approved` -> `pending`.
pub async fn unpublish_show(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
) -> Result<show::Model> {
    apply_action(pipeline, actor, show_id, ShowAction::Unpublish).await
}

/// `MakePrivateShow` - owner or admin, `pending` -> `private`.
pub async fn make_private_show(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
) -> Result<show::Model> {
    apply_action(pipeline, actor, show_id, ShowAction::MakePrivate).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::{Venue, venue};
    use crate::test_utils::*;

    fn action_for(kind: ActionKind) -> ShowAction {
        match kind {
            ActionKind::Approve => ShowAction::Approve {
                verify_venues: false,
            },
            ActionKind::Reject => ShowAction::Reject {
                reason: "spam".to_string(),
            },
            ActionKind::MakePrivate => ShowAction::MakePrivate,
            ActionKind::Publish => ShowAction::Publish,
            ActionKind::Unpublish => ShowAction::Unpublish,
        }
    }

    async fn force_status(pipeline: &Pipeline, show_id: i64, status: ShowStatus) -> Result<()> {
        let current = Show::find_by_id(show_id)
            .one(&pipeline.database)
            .await?
            .ok_or_else(|| Error::not_found("show", show_id))?;
        let mut active: show::ActiveModel = current.into();
        active.status = Set(status);
        active.update(&pipeline.database).await?;
        Ok(())
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(initial_status(true, true, true), ShowStatus::Private);
        assert_eq!(initial_status(false, true, true), ShowStatus::Approved);
        assert_eq!(initial_status(false, true, false), ShowStatus::Pending);
        assert_eq!(initial_status(false, false, true), ShowStatus::Pending);
    }

    #[test]
    fn test_rejected_is_terminal() {
        for kind in ActionKind::ALL {
            assert!(find_transition(ShowStatus::Rejected, kind).is_none());
        }
    }

    #[tokio::test]
    async fn test_illegal_transitions_leave_status_unchanged() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(5), "Legality").await?;

        for from in [
            ShowStatus::Pending,
            ShowStatus::Approved,
            ShowStatus::Rejected,
            ShowStatus::Private,
        ] {
            for kind in ActionKind::ALL {
                if find_transition(from, kind).is_some() {
                    continue;
                }
                force_status(&pipeline, show.id, from).await?;
                let result = apply_action(&pipeline, &admin(), show.id, action_for(kind)).await;
                assert!(
                    matches!(result, Err(Error::InvalidTransition { .. })),
                    "{from} + {kind} should be refused"
                );
                let reloaded = Show::find_by_id(show.id).one(&pipeline.database).await?.unwrap();
                assert_eq!(reloaded.status, from);
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_and_reject_are_admin_only() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(5), "Owner's show").await?;

        let result = approve_show(&pipeline, &member(5), show.id, false).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        let result = reject_show(&pipeline, &member(5), show.id, "nope").await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));
        let result = approve_show(&pipeline, &Actor::anonymous(), show.id, false).await;
        assert!(matches!(result, Err(Error::Unauthorized)));
        let result = approve_show(&pipeline, &admin(), 9999, false).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_non_owner_cannot_make_private() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(5), "Someone else's").await?;
        let result = make_private_show(&pipeline, &member(6), show.id).await;
        assert!(matches!(result, Err(Error::Forbidden { .. })));

        let private = make_private_show(&pipeline, &member(5), show.id).await?;
        assert_eq!(private.status, ShowStatus::Private);
        Ok(())
    }

    #[tokio::test]
    async fn test_cascade_verification() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let db = &pipeline.database;
        let verified = create_test_venue(db, "Crescent Ballroom", true).await?;
        let mut draft = test_draft("Cascade", "Valley Bar");
        draft
            .venues
            .push(crate::core::resolver::VenueRef::Existing(verified.id));
        let show = crate::core::shows::create_show(&pipeline, &member(3), draft).await?;
        let before = Venue::find_by_id(verified.id).one(db).await?.unwrap();

        let approved = approve_show(&pipeline, &admin(), show.show.id, true).await?;
        assert_eq!(approved.status, ShowStatus::Approved);

        let venues = Venue::find().all(db).await?;
        assert!(venues.iter().all(|v| v.verified));
        let after = Venue::find_by_id(verified.id).one(db).await?.unwrap();
        assert_eq!(after.updated_at, before.updated_at);

        let audit = sink.audit_entries();
        let verify_entries: Vec<_> = audit.iter().filter(|a| a.action == "verify_venue").collect();
        assert_eq!(verify_entries.len(), 1);
        assert!(audit.iter().any(|a| a.action == "approve_show"));
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_without_cascade_leaves_venues_unverified() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(3), "No cascade").await?;
        approve_show(&pipeline, &admin(), show.id, false).await?;
        let unverified = Venue::find()
            .filter(venue::Column::Verified.eq(false))
            .all(&pipeline.database)
            .await?;
        assert_eq!(unverified.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reject_records_reason_and_requires_one() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(3), "Bad listing").await?;

        let empty = reject_show(&pipeline, &admin(), show.id, "   ").await;
        assert!(matches!(empty, Err(Error::ValidationFailed { .. })));

        let rejected = reject_show(&pipeline, &admin(), show.id, "duplicate listing").await?;
        assert_eq!(rejected.status, ShowStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("duplicate listing"));
        assert!(
            sink.events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::ShowRejected { .. }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_publish_depends_on_venue_verification() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(3), "Private gig").await?;
        make_private_show(&pipeline, &member(3), show.id).await?;

        let published = publish_show(&pipeline, &member(3), show.id).await?;
        assert_eq!(published.status, ShowStatus::Pending);

        approve_show(&pipeline, &admin(), show.id, true).await?;
        unpublish_show(&pipeline, &member(3), show.id).await?;
        make_private_show(&pipeline, &member(3), show.id).await?;
        let republished = publish_show(&pipeline, &member(3), show.id).await?;
        assert_eq!(republished.status, ShowStatus::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn test_state_errors_are_conflicts() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(3), "Twice approved").await?;
        approve_show(&pipeline, &admin(), show.id, false).await?;
        let err = approve_show(&pipeline, &admin(), show.id, false)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        Ok(())
    }

    #[tokio::test]
    async fn test_no_events_for_failed_action() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(3), "Quiet").await?;
        let before = sink.events().len();
        let _ = unpublish_show(&pipeline, &member(3), show.id).await;
        assert_eq!(sink.events().len(), before);
        Ok(())
    }
}
