//! Venue operations - verification, direct edits and admin deletion.
//!
//! Verification only ever moves `false -> true`, either through [`verify_venue`] or as
//! the cascade of a show approval.

use crate::{
    core::{actor::Actor, events::PipelineEvent, pipeline::Pipeline, resolver::venue_identity_key},
    entities::{ShowVenue, Venue, show_venue, venue},
    errors::{Error, Result, is_unique_violation},
};
use sea_orm::{PaginatorTrait, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

/// A partial set of venue fields. Stored verbatim as the diff of a pending edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueChanges {
    /// New name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New city
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// New state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// New street address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// New postal code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,
}

impl VenueChanges {
    /// True when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Rejects empty diffs and blanked identity fields.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation("no venue changes supplied"));
        }
        for (field, value) in [
            ("name", &self.name),
            ("city", &self.city),
            ("state", &self.state),
        ] {
            if value.as_ref().is_some_and(|v| v.trim().is_empty()) {
                return Err(Error::validation(format!("venue {field} cannot be empty")));
            }
        }
        Ok(())
    }
}

/// Writes a diff onto a venue, keeping the identity key in step with name/city/state.
///
/// A diff that would make the venue collide with another venue's identity fails with
/// `Conflict`.
pub async fn apply_changes<C>(
    db: &C,
    current: venue::Model,
    changes: &VenueChanges,
) -> Result<venue::Model>
where
    C: ConnectionTrait,
{
    changes.validate()?;
    let name = changes.name.as_deref().unwrap_or(&current.name).trim().to_string();
    let city = changes.city.as_deref().unwrap_or(&current.city).trim().to_string();
    let state = changes.state.as_deref().unwrap_or(&current.state).trim().to_string();
    let identity_key = venue_identity_key(&name, &city, &state);

    let mut active: venue::ActiveModel = current.into();
    active.identity_key = Set(identity_key);
    active.name = Set(name);
    active.city = Set(city);
    active.state = Set(state);
    if let Some(address) = &changes.address {
        active.address = Set(Some(address.trim().to_string()).filter(|a| !a.is_empty()));
    }
    if let Some(zipcode) = &changes.zipcode {
        active.zipcode = Set(Some(zipcode.trim().to_string()).filter(|z| !z.is_empty()));
    }
    active.updated_at = Set(chrono::Utc::now());

    active.update(db).await.map_err(|err| {
        if is_unique_violation(&err) {
            Error::conflict("another venue already has that name in that city")
        } else {
            err.into()
        }
    })
}

/// Finds a venue by id.
pub async fn get_venue(db: &DatabaseConnection, venue_id: i64) -> Result<Option<venue::Model>> {
    Venue::find_by_id(venue_id).one(db).await.map_err(Into::into)
}

/// Marks the given venues verified, returning only those that changed.
pub async fn verify_unverified<C>(db: &C, venue_ids: &[i64]) -> Result<Vec<venue::Model>>
where
    C: ConnectionTrait,
{
    let unverified = Venue::find()
        .filter(venue::Column::Id.is_in(venue_ids.iter().copied()))
        .filter(venue::Column::Verified.eq(false))
        .all(db)
        .await?;

    let mut changed = Vec::with_capacity(unverified.len());
    for v in unverified {
        let mut active: venue::ActiveModel = v.into();
        active.verified = Set(true);
        active.updated_at = Set(chrono::Utc::now());
        changed.push(active.update(db).await?);
    }
    Ok(changed)
}

/// `VerifyVenue` - admin only. Verifying an already verified venue is a no-op.
pub async fn verify_venue(
    pipeline: &Pipeline,
    actor: &Actor,
    venue_id: i64,
) -> Result<venue::Model> {
    let actor_id = actor.require_admin()?;
    let db = &pipeline.database;

    let current = Venue::find_by_id(venue_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("venue", venue_id))?;
    if current.verified {
        return Ok(current);
    }

    let mut changed = verify_unverified(db, &[venue_id]).await?;
    let verified = changed
        .pop()
        .ok_or_else(|| Error::not_found("venue", venue_id))?;

    info!(venue_id, "Venue verified");
    pipeline.emit(vec![
        PipelineEvent::VenueVerified {
            venue_id,
            name: verified.name.clone(),
        },
        PipelineEvent::audit(actor_id, "verify_venue", "venue", venue_id, json!({})),
    ]);
    Ok(verified)
}

/// Edits a venue in place.
///
/// Admins may edit any venue; the original submitter may edit their venue while it is
/// still unverified. Everyone else goes through the pending edit queue.
pub async fn update_venue(
    pipeline: &Pipeline,
    actor: &Actor,
    venue_id: i64,
    changes: &VenueChanges,
) -> Result<venue::Model> {
    let actor_id = actor.id()?;
    changes.validate()?;

    let txn = pipeline.database.begin().await?;
    let current = Venue::find_by_id(venue_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("venue", venue_id))?;

    let owns_unverified = !current.verified && current.submitted_by == Some(actor_id);
    if !actor.is_admin && !owns_unverified {
        return Err(Error::forbidden(
            "verified venues can only be changed through a pending edit",
        ));
    }

    let updated = apply_changes(&txn, current, changes).await?;
    txn.commit().await?;

    info!(venue_id, actor_id, "Venue updated directly");
    if actor.is_admin {
        pipeline.emit(vec![PipelineEvent::audit(
            actor_id,
            "update_venue",
            "venue",
            venue_id,
            serde_json::to_value(changes)?,
        )]);
    }
    Ok(updated)
}

/// Admin delete. Refused while any show still lists the venue.
pub async fn delete_venue(pipeline: &Pipeline, actor: &Actor, venue_id: i64) -> Result<()> {
    let actor_id = actor.require_admin()?;
    let txn = pipeline.database.begin().await?;

    let current = Venue::find_by_id(venue_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("venue", venue_id))?;

    let shows = ShowVenue::find()
        .filter(show_venue::Column::VenueId.eq(venue_id))
        .count(&txn)
        .await?;
    if shows > 0 {
        return Err(Error::conflict(format!(
            "venue {} is used by {shows} show(s)",
            current.name
        )));
    }

    current.delete(&txn).await?;
    txn.commit().await?;

    info!(venue_id, "Venue deleted");
    pipeline.emit(vec![PipelineEvent::audit(
        actor_id,
        "delete_venue",
        "venue",
        venue_id,
        json!({}),
    )]);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_verify_venue_admin_only() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let venue = create_test_venue(&pipeline.database, "Valley Bar", false).await?;

        let denied = verify_venue(&pipeline, &member(1), venue.id).await;
        assert!(matches!(denied, Err(Error::Forbidden { .. })));

        let verified = verify_venue(&pipeline, &admin(), venue.id).await?;
        assert!(verified.verified);
        assert_eq!(sink.audit_entries().len(), 1);

        // Second call is a no-op and logs nothing new.
        verify_venue(&pipeline, &admin(), venue.id).await?;
        assert_eq!(sink.audit_entries().len(), 1);

        let missing = verify_venue(&pipeline, &admin(), 999).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_venue_permissions() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let verified = create_test_venue(&pipeline.database, "Crescent Ballroom", true).await?;
        let changes = VenueChanges {
            address: Some("308 N 2nd Ave".to_string()),
            ..Default::default()
        };

        let denied = update_venue(&pipeline, &member(2), verified.id, &changes).await;
        assert!(matches!(denied, Err(Error::Forbidden { .. })));

        let updated = update_venue(&pipeline, &admin(), verified.id, &changes).await?;
        assert_eq!(updated.address.as_deref(), Some("308 N 2nd Ave"));
        assert!(updated.verified);
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_updates_identity_and_detects_collision() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let a = create_test_venue(&pipeline.database, "Valley Bar", true).await?;
        create_test_venue(&pipeline.database, "Crescent Ballroom", true).await?;

        let renamed = update_venue(
            &pipeline,
            &admin(),
            a.id,
            &VenueChanges {
                name: Some("Valley Bar & Lounge".to_string()),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(renamed.identity_key, "valley bar & lounge|phoenix|az");
        assert_eq!(renamed.slug, a.slug);

        let collision = update_venue(
            &pipeline,
            &admin(),
            a.id,
            &VenueChanges {
                name: Some("crescent ballroom".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(collision, Err(Error::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_venue_in_use_is_refused() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let show = create_test_show(&pipeline, &member(1), "Keeps venue alive").await?;
        let venues = crate::core::assembler::venues_for_show(&pipeline.database, show.id).await?;

        let refused = delete_venue(&pipeline, &admin(), venues[0].id).await;
        assert!(matches!(refused, Err(Error::Conflict { .. })));

        let orphan = create_test_venue(&pipeline.database, "Empty Room", false).await?;
        delete_venue(&pipeline, &admin(), orphan.id).await?;
        assert!(get_venue(&pipeline.database, orphan.id).await?.is_none());
        Ok(())
    }

    #[test]
    fn test_changes_validation() {
        assert!(matches!(
            VenueChanges::default().validate(),
            Err(Error::ValidationFailed { .. })
        ));
        let blank_name = VenueChanges {
            name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank_name.validate().is_err());
    }
}
