//! Two-phase markdown import: read-only preview, then confirm.
//!
//! Confirm parses and resolves again from scratch instead of trusting its preview. If
//! the catalog moved in between (another import created the venue first, say) the
//! confirm result simply reflects the catalog at confirm time.
//!
//! Bulk forms run each file on its own; one bad file never sinks the batch.

use crate::{
    config::limits::BatchLimits,
    core::{
        actor::Actor,
        assembler::{ShowWithRelations, assemble_show, load_show_with_relations},
        lifecycle::initial_status,
        markdown::{self, ParsedShowImport},
        pipeline::Pipeline,
        resolver::{ArtistRef, Lookup, VenueRef, lookup_artist, lookup_venue},
        shows::{TitleMatch, find_similar_show},
    },
    entities::{ShowSource, ShowStatus},
    errors::{Error, Result},
};
use sea_orm::TransactionTrait;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Preview of one venue or artist reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityPreview {
    /// Name as written in the file
    pub name: String,
    /// Id of the matched record; `None` when confirm would create one
    pub existing_id: Option<i64>,
    /// Whether confirming now would insert a new record
    pub will_create: bool,
    /// Venues only
    pub verified: Option<bool>,
}

/// Result of [`preview_show_import`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportPreview {
    /// The parsed file
    pub parsed: ParsedShowImport,
    /// One entry per listed venue
    pub venues: Vec<EntityPreview>,
    /// One entry per billed artist
    pub artists: Vec<EntityPreview>,
    /// Parser warnings plus duplicate hints
    pub warnings: Vec<String>,
    /// Whether confirm would be accepted
    pub can_import: bool,
    /// Status the show would start in if confirmed now
    pub expected_status: ShowStatus,
}

/// One file's outcome in a bulk preview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkPreviewItem {
    /// Position in the submitted files
    pub index: usize,
    /// Preview when the file parsed
    pub preview: Option<ImportPreview>,
    /// Why the file could not be previewed
    pub error: Option<String>,
}

/// Counts over a bulk preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkPreviewSummary {
    /// Files submitted
    pub total: usize,
    /// Venues confirm would create
    pub new_venues: usize,
    /// Venues that already exist
    pub existing_venues: usize,
    /// Artists confirm would create
    pub new_artists: usize,
    /// Artists that already exist
    pub existing_artists: usize,
    /// Warnings across all files
    pub total_warnings: usize,
    /// True when every file previewed cleanly and can be imported
    pub all_importable: bool,
}

/// Result of [`preview_bulk_import`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkPreview {
    /// Per-file previews in submission order
    pub items: Vec<BulkPreviewItem>,
    /// Totals over `items`
    pub summary: BulkPreviewSummary,
}

/// One file's outcome in a bulk confirm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkImportItem {
    /// Position in the submitted files
    pub index: usize,
    /// Created show
    pub show_id: Option<i64>,
    /// Title of the created show
    pub title: Option<String>,
    /// Why the file was not imported
    pub error: Option<String>,
}

/// Result of [`confirm_bulk_import`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkImportResult {
    /// Per-file results in submission order
    pub items: Vec<BulkImportItem>,
    /// Files imported
    pub success_count: usize,
    /// Files that failed
    pub error_count: usize,
}

/// One show's outcome in a bulk export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportItem {
    /// Requested show
    pub show_id: i64,
    /// The exported file
    pub markdown: Option<String>,
    /// Why the show could not be exported
    pub error: Option<String>,
}

fn entity_preview<T>(
    name: &str,
    lookup: &Lookup<T>,
    id: impl Fn(&T) -> i64,
    verified: impl Fn(&T) -> Option<bool>,
) -> EntityPreview {
    match lookup {
        Lookup::Existing(entity) => EntityPreview {
            name: name.to_string(),
            existing_id: Some(id(entity)),
            will_create: false,
            verified: verified(entity),
        },
        Lookup::WillCreate => EntityPreview {
            name: name.to_string(),
            existing_id: None,
            will_create: true,
            verified: None,
        },
    }
}

/// `PreviewShowImport` - parses and resolves without writing anything.
#[instrument(skip(pipeline, actor, content), fields(actor = ?actor.user_id, bytes = content.len()))]
pub async fn preview_show_import(
    pipeline: &Pipeline,
    actor: &Actor,
    content: &[u8],
) -> Result<ImportPreview> {
    actor.id()?;
    let parsed = markdown::parse(content)?;
    let db = &pipeline.database;
    let mut warnings = parsed.warnings.clone();

    let mut venues = Vec::with_capacity(parsed.venues.len());
    let mut all_verified = true;
    for input in &parsed.venues {
        let lookup = lookup_venue(db, &VenueRef::Described(input.clone())).await?;
        match &lookup {
            Lookup::Existing(v) => {
                all_verified &= v.verified;
                if let Some((show, matched)) = find_similar_show(
                    db,
                    v.id,
                    parsed.event_date.date_naive(),
                    &parsed.title,
                )
                .await?
                {
                    let how = match matched {
                        TitleMatch::Same => "already exists",
                        TitleMatch::Similar => "looks similar",
                    };
                    warnings.push(format!(
                        "possible duplicate: show {} ({:?}) at {} on that date {how}",
                        show.id, show.title, v.name
                    ));
                }
            }
            // Admin-created venues start verified.
            Lookup::WillCreate => all_verified &= actor.is_admin,
        }
        venues.push(entity_preview(&input.name, &lookup, |v| v.id, |v| Some(v.verified)));
    }

    let mut artists = Vec::with_capacity(parsed.artists.len());
    for a in &parsed.artists {
        let lookup = lookup_artist(db, &ArtistRef::Described(a.input.clone())).await?;
        artists.push(entity_preview(&a.input.name, &lookup, |x| x.id, |_| None));
    }

    let can_import = parsed.is_complete();
    let expected_status = initial_status(parsed.private, actor.is_admin, all_verified);
    info!(
        title = %parsed.title,
        can_import,
        warnings = warnings.len(),
        "Import previewed"
    );

    Ok(ImportPreview {
        parsed,
        venues,
        artists,
        warnings,
        can_import,
        expected_status,
    })
}

/// `ConfirmShowImport` - re-parses, resolves and assembles in one transaction.
#[instrument(skip(pipeline, actor, content), fields(actor = ?actor.user_id, bytes = content.len()))]
pub async fn confirm_show_import(
    pipeline: &Pipeline,
    actor: &Actor,
    content: &[u8],
) -> Result<ShowWithRelations> {
    actor.id()?;
    let parsed = markdown::parse(content)?;
    if parsed.venues.is_empty() {
        return Err(Error::validation(format!(
            "{:?} lists no venues and cannot be imported",
            parsed.title
        )));
    }
    let draft = parsed.to_draft(ShowSource::Import);

    let txn = pipeline.database.begin().await?;
    let assembled = assemble_show(&txn, actor, &draft, None).await?;
    txn.commit().await?;

    info!(show_id = assembled.show.id, status = %assembled.show.status, "Import confirmed");
    pipeline.emit(assembled.events());
    Ok(assembled.to_relations())
}

/// Bulk `PreviewShowImport`. The cap is checked before any file is read.
pub async fn preview_bulk_import(
    pipeline: &Pipeline,
    actor: &Actor,
    files: &[Vec<u8>],
) -> Result<BulkPreview> {
    actor.id()?;
    BatchLimits::check("bulk import", files.len(), pipeline.limits.max_bulk_import)?;

    let mut summary = BulkPreviewSummary {
        total: files.len(),
        all_importable: true,
        ..Default::default()
    };
    let mut items = Vec::with_capacity(files.len());
    for (index, content) in files.iter().enumerate() {
        match preview_show_import(pipeline, actor, content).await {
            Ok(preview) => {
                let new_venues = preview.venues.iter().filter(|v| v.will_create).count();
                let new_artists = preview.artists.iter().filter(|a| a.will_create).count();
                summary.new_venues += new_venues;
                summary.existing_venues += preview.venues.len() - new_venues;
                summary.new_artists += new_artists;
                summary.existing_artists += preview.artists.len() - new_artists;
                summary.total_warnings += preview.warnings.len();
                summary.all_importable &= preview.can_import;
                items.push(BulkPreviewItem {
                    index,
                    preview: Some(preview),
                    error: None,
                });
            }
            Err(err) => {
                summary.all_importable = false;
                items.push(BulkPreviewItem {
                    index,
                    preview: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    Ok(BulkPreview { items, summary })
}

/// Bulk `ConfirmShowImport`. Each file commits or fails on its own.
pub async fn confirm_bulk_import(
    pipeline: &Pipeline,
    actor: &Actor,
    files: &[Vec<u8>],
) -> Result<BulkImportResult> {
    actor.id()?;
    BatchLimits::check("bulk import", files.len(), pipeline.limits.max_bulk_import)?;

    let mut items = Vec::with_capacity(files.len());
    for (index, content) in files.iter().enumerate() {
        let item = match confirm_show_import(pipeline, actor, content).await {
            Ok(show) => BulkImportItem {
                index,
                show_id: Some(show.show.id),
                title: Some(show.show.title),
                error: None,
            },
            Err(err) => {
                warn!(index, error = %err, "Bulk import item failed");
                BulkImportItem {
                    index,
                    show_id: None,
                    title: None,
                    error: Some(err.to_string()),
                }
            }
        };
        items.push(item);
    }

    let success_count = items.iter().filter(|i| i.error.is_none()).count();
    let error_count = items.len() - success_count;
    info!(success_count, error_count, "Bulk import finished");
    Ok(BulkImportResult {
        items,
        success_count,
        error_count,
    })
}

/// `ExportShowToMarkdown`.
///
/// Approved shows are public; anything else is visible only to its submitter or an
/// admin, and is reported as `NotFound` to everyone else.
pub async fn export_show_to_markdown(
    pipeline: &Pipeline,
    actor: &Actor,
    show_id: i64,
) -> Result<String> {
    let show = load_show_with_relations(&pipeline.database, show_id).await?;
    let visible = show.show.status == ShowStatus::Approved
        || actor.is_admin
        || actor.user_id == Some(show.show.submitted_by);
    if !visible {
        return Err(Error::not_found("show", show_id));
    }
    Ok(markdown::export(&show))
}

/// Bulk export, capped by `max_bulk_export`.
pub async fn export_shows(
    pipeline: &Pipeline,
    actor: &Actor,
    show_ids: &[i64],
) -> Result<Vec<ExportItem>> {
    BatchLimits::check("bulk export", show_ids.len(), pipeline.limits.max_bulk_export)?;
    let mut items = Vec::with_capacity(show_ids.len());
    for &show_id in show_ids {
        items.push(match export_show_to_markdown(pipeline, actor, show_id).await {
            Ok(markdown) => ExportItem {
                show_id,
                markdown: Some(markdown),
                error: None,
            },
            Err(err) => ExportItem {
                show_id,
                markdown: None,
                error: Some(err.to_string()),
            },
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::events::PipelineEvent;
    use crate::entities::{Artist, Show, Venue};
    use crate::test_utils::*;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn test_preview_writes_nothing() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let preview = preview_show_import(
            &pipeline,
            &member(3),
            sample_markdown("Dry Cleaning", "Valley Bar").as_bytes(),
        )
        .await?;

        assert!(preview.can_import);
        assert_eq!(preview.expected_status, ShowStatus::Pending);
        assert!(preview.venues.iter().all(|v| v.will_create));
        assert_eq!(preview.artists.len(), 2);

        let db = &pipeline.database;
        assert_eq!(Venue::find().count(db).await?, 0);
        assert_eq!(Artist::find().count(db).await?, 0);
        assert_eq!(Show::find().count(db).await?, 0);
        assert!(sink.events().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_reports_existing_entities_and_duplicates() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let content = sample_markdown("Dry Cleaning", "Valley Bar");
        confirm_show_import(&pipeline, &admin(), content.as_bytes()).await?;

        let preview = preview_show_import(&pipeline, &admin(), content.as_bytes()).await?;
        assert!(preview.venues.iter().all(|v| !v.will_create && v.verified == Some(true)));
        assert!(preview.artists.iter().all(|a| a.existing_id.is_some()));
        assert_eq!(preview.expected_status, ShowStatus::Approved);
        assert!(preview.warnings.iter().any(|w| w.contains("possible duplicate")));
        assert!(preview.can_import);
        Ok(())
    }

    #[tokio::test]
    async fn test_preview_without_venues_cannot_import() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let content = "---\ntitle: Homeless Show\ndate: 2026-06-01\ntime: 21:00\n---\n";
        let preview = preview_show_import(&pipeline, &member(1), content.as_bytes()).await?;
        assert!(!preview.can_import);

        let confirm = confirm_show_import(&pipeline, &member(1), content.as_bytes()).await;
        assert!(matches!(confirm, Err(Error::ValidationFailed { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_emits_enrichment_for_new_artists() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let show = confirm_show_import(
            &pipeline,
            &member(3),
            sample_markdown("Dry Cleaning", "Valley Bar").as_bytes(),
        )
        .await?;
        assert_eq!(show.show.source, ShowSource::Import);

        let created: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::ArtistCreated { .. }))
            .collect();
        assert_eq!(created.len(), 2);

        // Second import of the same artists creates none.
        confirm_show_import(
            &pipeline,
            &member(3),
            sample_markdown("Dry Cleaning Late Show", "Valley Bar").as_bytes(),
        )
        .await?;
        let created_after = sink
            .events()
            .iter()
            .filter(|e| matches!(e, PipelineEvent::ArtistCreated { .. }))
            .count();
        assert_eq!(created_after, 3); // only the new title-named headliner
        Ok(())
    }

    #[tokio::test]
    async fn test_confirm_matches_venue_created_after_preview() -> Result<()> {
        let (pipeline, sink) = setup_pipeline().await?;
        let content = sample_markdown("Dry Cleaning", "Valley Bar");

        let preview = preview_show_import(&pipeline, &member(3), content.as_bytes()).await?;
        assert!(preview.venues[0].will_create);

        // Another submitter creates the venue between preview and confirm.
        let venue = create_test_venue(&pipeline.database, "Valley Bar", false).await?;

        let show = confirm_show_import(&pipeline, &member(3), content.as_bytes()).await?;
        assert_eq!(show.venues.len(), 1);
        assert_eq!(show.venues[0].id, venue.id);
        assert_eq!(Venue::find().count(&pipeline.database).await?, 1);
        assert!(
            !sink
                .events()
                .iter()
                .any(|e| matches!(e, PipelineEvent::VenueCreated { .. }))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_partial_failure() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let files = vec![
            sample_markdown("First Show", "Valley Bar").into_bytes(),
            b"no frontmatter here".to_vec(),
            sample_markdown("Third Show", "Crescent Ballroom").into_bytes(),
        ];

        let preview = preview_bulk_import(&pipeline, &member(2), &files).await?;
        assert!(!preview.summary.all_importable);
        assert_eq!(preview.summary.total, 3);
        assert_eq!(preview.summary.new_venues, 2);
        assert!(preview.items[1].error.is_some());

        let result = confirm_bulk_import(&pipeline, &member(2), &files).await?;
        assert_eq!(result.success_count, 2);
        assert_eq!(result.error_count, 1);
        assert!(result.items[1].error.as_deref().unwrap().contains("frontmatter"));

        let titles: Vec<_> = Show::find()
            .all(&pipeline.database)
            .await?
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["First Show", "Third Show"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_cap_checked_first() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let pipeline = pipeline.with_limits(BatchLimits {
            max_bulk_import: 1,
            ..BatchLimits::default()
        });
        let files = vec![
            sample_markdown("One", "Valley Bar").into_bytes(),
            sample_markdown("Two", "Valley Bar").into_bytes(),
        ];
        let result = confirm_bulk_import(&pipeline, &member(2), &files).await;
        assert!(matches!(result, Err(Error::ValidationFailed { .. })));
        assert_eq!(Show::find().count(&pipeline.database).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_export_visibility() -> Result<()> {
        let (pipeline, _sink) = setup_pipeline().await?;
        let pending = confirm_show_import(
            &pipeline,
            &member(3),
            sample_markdown("Pending Show", "Valley Bar").as_bytes(),
        )
        .await?;

        let hidden = export_show_to_markdown(&pipeline, &member(4), pending.show.id).await;
        assert!(matches!(hidden, Err(Error::NotFound { .. })));

        let own = export_show_to_markdown(&pipeline, &member(3), pending.show.id).await?;
        assert!(own.contains("title: Pending Show"));

        let items = export_shows(&pipeline, &admin(), &[pending.show.id, 999]).await?;
        assert!(items[0].markdown.is_some());
        assert!(items[1].error.is_some());
        Ok(())
    }
}
