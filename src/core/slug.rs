//! URL slug derivation.

use crate::errors::Result;
use regex::Regex;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // literal pattern
    Regex::new(r"[^a-z0-9]+").unwrap()
});

/// Lowercases and hyphenates, e.g. `"Valley Bar!"` -> `"valley-bar"`.
#[must_use]
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase().replace('&', " and ");
    let slug = NON_ALNUM.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.to_string()
    }
}

/// Returns `base` or the first of `base-2`, `base-3`, ... not yet used in `column`.
pub async fn unique_slug<C, E>(db: &C, column: E::Column, base: &str) -> Result<String>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync,
{
    let mut candidate = base.to_string();
    let mut suffix = 2;
    while E::find().filter(column.eq(candidate.as_str())).count(db).await? > 0 {
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Valley Bar"), "valley-bar");
        assert_eq!(slugify("  The Rebel Lounge!! "), "the-rebel-lounge");
        assert_eq!(slugify("Crosby, Stills & Nash"), "crosby-stills-and-nash");
        assert_eq!(slugify("!!!"), "untitled");
    }
}
