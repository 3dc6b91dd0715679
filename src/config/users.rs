//! Admin identity configuration from environment variables.
//!
//! The core never authenticates anyone. The admin CLI needs to know whether the user it
//! acts for is an admin, and reads that from `SHOWLIST_ADMIN_IDS` (comma-separated ids).

use std::collections::HashSet;

/// Environment variable holding the admin user ids
pub const ADMIN_IDS_VAR: &str = "SHOWLIST_ADMIN_IDS";

/// Reads the configured admin ids. Unparseable entries are skipped.
#[must_use]
pub fn get_admin_ids() -> HashSet<i64> {
    std::env::var(ADMIN_IDS_VAR)
        .map(|raw| parse_admin_ids(&raw))
        .unwrap_or_default()
}

/// Whether `user_id` is listed as an admin.
#[must_use]
pub fn is_admin(user_id: i64) -> bool {
    get_admin_ids().contains(&user_id)
}

fn parse_admin_ids(raw: &str) -> HashSet<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}
