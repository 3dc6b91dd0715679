/// Authentication context handed in by the transport layer
pub mod actor;

/// Show assembly: builds shows and their venue/artist links in a caller's transaction
pub mod assembler;

/// Discovery ingestion of scraped events
pub mod discovery;

/// Post-commit events: audit entries, notifications and enrichment triggers
pub mod events;

/// Two-phase markdown import and export
pub mod import;

/// Show status state machine and moderation actions
pub mod lifecycle;

/// Markdown codec for show listings
pub mod markdown;

/// Shared pipeline context
pub mod pipeline;

/// Find-or-create resolution of venues and artists
pub mod resolver;

/// Show create, update, flag and delete operations
pub mod shows;

/// URL slugs
pub mod slug;

/// Pending venue edit queue
pub mod venue_edits;

/// Venue verification and admin maintenance
pub mod venues;

pub use pipeline::Pipeline;
