//! Shared test utilities for `showlist`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating catalog records with sensible defaults.

use crate::{
    core::{
        Pipeline,
        actor::Actor,
        assembler::{ShowArtistInput, ShowDraft},
        events::RecordingSink,
        resolver::{ArtistInput, ArtistRef, VenueInput, VenueRef, resolve_venue},
        shows::create_show,
    },
    entities::{ShowSource, show, venue},
    errors::Result,
};
use chrono::{TimeZone, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Sets up a pipeline over a fresh database whose events land in the returned sink.
pub async fn setup_pipeline() -> Result<(Pipeline, RecordingSink)> {
    let db = setup_test_db().await?;
    let sink = RecordingSink::default();
    let pipeline = Pipeline::new(db).with_events(Arc::new(sink.clone()));
    Ok((pipeline, sink))
}

/// Routes `tracing` output through the test harness. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Admin with user id 1.
#[must_use]
pub const fn admin() -> Actor {
    Actor::admin(1)
}

/// Regular user.
#[must_use]
pub const fn member(user_id: i64) -> Actor {
    Actor::user(user_id)
}

/// Venue description without address details.
#[must_use]
pub fn venue_input(name: &str, city: &str, state: &str) -> VenueInput {
    VenueInput {
        name: name.to_string(),
        city: city.to_string(),
        state: state.to_string(),
        address: None,
        zipcode: None,
    }
}

/// Creates a venue in Phoenix, AZ.
///
/// Verified venues are created as the admin; unverified ones as user 99.
pub async fn create_test_venue(
    db: &DatabaseConnection,
    name: &str,
    verified: bool,
) -> Result<venue::Model> {
    let actor = if verified { admin() } else { member(99) };
    let resolved = resolve_venue(
        db,
        &VenueRef::Described(venue_input(name, "Phoenix", "AZ")),
        &actor,
    )
    .await?;
    Ok(resolved.entity)
}

/// A draft for 2026-05-14 20:00 UTC at `venue_name` (Phoenix, AZ), billed to an artist
/// named after the show.
#[must_use]
pub fn test_draft(title: &str, venue_name: &str) -> ShowDraft {
    ShowDraft {
        title: title.to_string(),
        event_date: Utc
            .with_ymd_and_hms(2026, 5, 14, 20, 0, 0)
            .single()
            .unwrap_or_default(),
        city: None,
        state: None,
        price: None,
        age_requirement: None,
        description: None,
        ticket_url: None,
        is_sold_out: false,
        is_cancelled: false,
        private: false,
        venues: vec![VenueRef::Described(venue_input(venue_name, "Phoenix", "AZ"))],
        artists: vec![ShowArtistInput {
            artist: ArtistRef::Described(ArtistInput::named(title)),
            is_headliner: true,
        }],
        source: ShowSource::User,
        external_id: None,
    }
}

/// Creates a show at "Valley Bar" through the normal submission path.
pub async fn create_test_show(
    pipeline: &Pipeline,
    actor: &Actor,
    title: &str,
) -> Result<show::Model> {
    let created = create_show(pipeline, actor, test_draft(title, "Valley Bar")).await?;
    Ok(created.show)
}

/// A complete show file for 2026-05-14 8:00 PM at `venue_name`, headlined by an artist
/// named after the show with "Nourished by Time" in support.
#[must_use]
pub fn sample_markdown(title: &str, venue_name: &str) -> String {
    format!(
        "---
title: {title}
date: 2026-05-14
time: 8:00 PM
price: $25
age: 21+
tickets: https://tickets.example.com/{slug}
---

## Venues
- {venue_name} | Phoenix | AZ | 130 N Central Ave | 85004

## Artists
- {title} | headliner | bandcamp: https://{slug}.bandcamp.com
- Nourished by Time

## Description
An evening of live music.
",
        slug = crate::core::slug::slugify(title),
    )
}
