//! Markdown codec for show listings.
//!
//! A show file is a `---` fenced frontmatter block of `key: value` lines followed by
//! `## Venues`, `## Artists` and `## Description` sections:
//!
//! ```text
//! ---
//! title: Dry Cleaning
//! date: 2026-05-14
//! time: 8:00 PM
//! price: 25
//! age: 21+
//! tickets: https://example.com/t/123
//! ---
//!
//! ## Venues
//! - Valley Bar | Phoenix | AZ | 130 N Central Ave | 85004
//!
//! ## Artists
//! - Dry Cleaning | headliner | bandcamp: https://drycleaning.bandcamp.com
//! - Nourished by Time
//!
//! ## Description
//! Free text until the next heading.
//! ```
//!
//! [`parse`] is lenient: anything recoverable becomes a warning rather than a failure.
//! [`export`] writes the same layout, so `parse(export(show))` gives back the title,
//! date, venues and bill.

use crate::{
    core::{
        assembler::{ShowArtistInput, ShowDraft, ShowWithRelations},
        resolver::{ArtistInput, ArtistRef, VenueInput, VenueRef},
    },
    entities::{ShowSource, ShowStatus},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::{fmt::Write as _, sync::LazyLock};

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)] // literal pattern
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*(am|pm)$").unwrap()
});

const FENCE: &str = "---";

/// Time used when a listing gives none.
pub const DEFAULT_SHOW_TIME: (u32, u32) = (20, 0);

/// An artist line from the `## Artists` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedArtist {
    /// Name and links
    pub input: ArtistInput,
    /// Marked `headliner` in the file
    pub is_headliner: bool,
}

/// A parsed show file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedShowImport {
    /// Show title
    pub title: String,
    /// Date and time, 8:00 PM when no time was given
    pub event_date: DateTime<Utc>,
    /// City override
    pub city: Option<String>,
    /// State override
    pub state: Option<String>,
    /// Price with `$` and `,` stripped; `free` is zero
    pub price: Option<f64>,
    /// Age policy
    pub age_requirement: Option<String>,
    /// Ticket link
    pub ticket_url: Option<String>,
    /// The `## Description` section
    pub description: Option<String>,
    /// Sold-out flag
    pub is_sold_out: bool,
    /// Cancelled flag
    pub is_cancelled: bool,
    /// Submit as private
    pub private: bool,
    /// The `## Venues` section
    pub venues: Vec<VenueInput>,
    /// The `## Artists` section, or the title when it is empty
    pub artists: Vec<ParsedArtist>,
    /// Recoverable problems, in the order they were found
    pub warnings: Vec<String>,
}

impl ParsedShowImport {
    /// Whether the assembler would accept this listing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.venues.is_empty() && !self.artists.is_empty()
    }

    /// Converts into a draft for the assembler.
    #[must_use]
    pub fn to_draft(&self, source: ShowSource) -> ShowDraft {
        ShowDraft {
            title: self.title.clone(),
            event_date: self.event_date,
            city: self.city.clone(),
            state: self.state.clone(),
            price: self.price,
            age_requirement: self.age_requirement.clone(),
            description: self.description.clone(),
            ticket_url: self.ticket_url.clone(),
            is_sold_out: self.is_sold_out,
            is_cancelled: self.is_cancelled,
            private: self.private,
            venues: self
                .venues
                .iter()
                .cloned()
                .map(VenueRef::Described)
                .collect(),
            artists: self
                .artists
                .iter()
                .map(|a| ShowArtistInput {
                    artist: ArtistRef::Described(a.input.clone()),
                    is_headliner: a.is_headliner,
                })
                .collect(),
            source,
            external_id: None,
        }
    }
}

fn parse_failure(message: impl Into<String>) -> Error {
    Error::ParseFailure {
        message: message.into(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Strips one enclosing pair of double quotes and unescapes `\"` and `\\` inside it.
/// Unquoted values are returned as written.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some(next @ ('"' | '\\'))) => {
                out.push(next);
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Quotes a frontmatter value when reading it back raw would lose characters.
fn quote(value: &str) -> String {
    if value.starts_with('"') || value.ends_with('"') {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Splits a list item on `|`, treating `\|` as a literal pipe and `\\` as a backslash.
fn split_fields(item: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = item.chars();
    while let Some(c) = chars.next() {
        match (c, chars.clone().next()) {
            ('\\', Some(next @ ('|' | '\\'))) => {
                current.push(next);
                chars.next();
            }
            ('|', _) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields.iter().map(|f| f.trim().to_string()).collect()
}

fn escape_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace('|', "\\|")
}

#[derive(Default)]
struct Frontmatter {
    title: Option<String>,
    date: Option<String>,
    time: Option<String>,
    city: Option<String>,
    state: Option<String>,
    price: Option<String>,
    age: Option<String>,
    tickets: Option<String>,
    sold_out: Option<String>,
    cancelled: Option<String>,
    private: Option<String>,
}

fn split_frontmatter(text: &str) -> Result<(&str, &str)> {
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let rest = text
        .strip_prefix(FENCE)
        .ok_or_else(|| parse_failure("missing frontmatter: file must start with ---"))?;
    let rest = rest.trim_start_matches(['\r', '\n']);

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    Err(parse_failure("unterminated frontmatter: closing --- not found"))
}

fn parse_frontmatter(block: &str, warnings: &mut Vec<String>) -> Frontmatter {
    let mut fm = Frontmatter::default();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            warnings.push(format!("ignored frontmatter line without a key: {line:?}"));
            continue;
        };
        let value = non_empty(&unquote(value.trim()));
        let slot = match key.trim().to_lowercase().replace('-', "_").as_str() {
            "title" => &mut fm.title,
            "date" => &mut fm.date,
            "time" => &mut fm.time,
            "city" => &mut fm.city,
            "state" => &mut fm.state,
            "price" => &mut fm.price,
            "age" | "age_requirement" => &mut fm.age,
            "tickets" | "ticket_url" => &mut fm.tickets,
            "sold_out" => &mut fm.sold_out,
            "cancelled" | "canceled" => &mut fm.cancelled,
            "private" => &mut fm.private,
            other => {
                warnings.push(format!("unknown frontmatter field '{other}' ignored"));
                continue;
            }
        };
        *slot = value;
    }
    fm
}

/// Parses a date, returning a warning for day/month orders that could be read both ways.
fn parse_date(input: &str) -> Option<(NaiveDate, Option<NaiveTime>, Option<String>)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        let utc = dt.with_timezone(&Utc);
        return Some((utc.date_naive(), Some(utc.time()), None));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some((date, None, None));
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%m/%d/%Y") {
        let mut parts = input.split('/');
        let first: u32 = parts.next()?.parse().ok()?;
        let second: u32 = parts.next()?.parse().ok()?;
        let warning = (first <= 12 && second <= 12 && first != second).then(|| {
            format!("ambiguous date {input:?}, read as month/day ({date})")
        });
        return Some((date, None, warning));
    }
    ["%B %d, %Y", "%b %d, %Y", "%A, %B %d, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .map(|date| (date, None, None))
}

fn parse_time(input: &str) -> Option<NaiveTime> {
    if let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") {
        return Some(time);
    }
    let caps = TIME_RE.captures(input.trim())?;
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("pm");
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_flag(name: &str, value: Option<&String>, warnings: &mut Vec<String>) -> bool {
    match value.map(|v| v.to_lowercase()).as_deref() {
        None | Some("false" | "no" | "0") => false,
        Some("true" | "yes" | "1") => true,
        Some(other) => {
            warnings.push(format!("{name}: expected true/false, got {other:?}; using false"));
            false
        }
    }
}

fn parse_price(value: &str, warnings: &mut Vec<String>) -> Option<f64> {
    let cleaned = value.trim().trim_start_matches('$').replace(',', "");
    if cleaned.eq_ignore_ascii_case("free") {
        return Some(0.0);
    }
    match cleaned.parse::<f64>() {
        Ok(p) if p.is_finite() && p >= 0.0 => Some(p),
        _ => {
            warnings.push(format!("price {value:?} is not a number; left blank"));
            None
        }
    }
}

fn list_item(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim)
}

fn parse_venue_line(item: &str, warnings: &mut Vec<String>) -> Option<VenueInput> {
    let fields = split_fields(item);
    let field = |i: usize| fields.get(i).and_then(|f| non_empty(f));
    match (field(0), field(1), field(2)) {
        (Some(name), Some(city), Some(state)) => Some(VenueInput {
            name,
            city,
            state,
            address: field(3),
            zipcode: field(4),
        }),
        _ => {
            warnings.push(format!(
                "venue line {item:?} needs at least 'Name | City | State'; skipped"
            ));
            None
        }
    }
}

fn parse_artist_line(item: &str, warnings: &mut Vec<String>) -> Option<ParsedArtist> {
    let mut fields = split_fields(item).into_iter();
    let Some(name) = fields.next().as_deref().and_then(non_empty) else {
        warnings.push("artist line without a name skipped".to_string());
        return None;
    };
    let mut artist = ParsedArtist {
        input: ArtistInput::named(name),
        is_headliner: false,
    };
    for field in fields {
        if field.eq_ignore_ascii_case("headliner") {
            artist.is_headliner = true;
        } else if let Some((key, value)) = field.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = non_empty(value);
            match key.as_str() {
                "bandcamp" => artist.input.bandcamp_url = value,
                "spotify" => artist.input.spotify_url = value,
                _ => warnings.push(format!("unknown artist attribute {field:?} ignored")),
            }
        } else if !field.is_empty() {
            warnings.push(format!("unknown artist attribute {field:?} ignored"));
        }
    }
    Some(artist)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Venues,
    Artists,
    Description,
    Unknown,
}

/// Parses a show file from raw bytes.
pub fn parse(bytes: &[u8]) -> Result<ParsedShowImport> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| parse_failure(format!("file is not valid UTF-8: {e}")))?;
    parse_str(text)
}

/// Parses a show file.
///
/// Fails only when the frontmatter, title or date is missing or unreadable.
pub fn parse_str(text: &str) -> Result<ParsedShowImport> {
    let mut warnings = Vec::new();
    let (front, body) = split_frontmatter(text)?;
    let fm = parse_frontmatter(front, &mut warnings);

    let title = fm
        .title
        .clone()
        .ok_or_else(|| parse_failure("missing required field: title"))?;
    let raw_date = fm
        .date
        .as_deref()
        .ok_or_else(|| parse_failure("missing required field: date"))?;
    let (date, date_time, date_warning) = parse_date(raw_date)
        .ok_or_else(|| parse_failure(format!("unrecognised date {raw_date:?}")))?;
    warnings.extend(date_warning);

    let time = match (fm.time.as_deref(), date_time) {
        (Some(raw), _) => parse_time(raw).or_else(|| {
            warnings.push(format!("unrecognised time {raw:?}; defaulting to 8:00 PM"));
            None
        }),
        (None, Some(t)) => Some(t),
        (None, None) => {
            warnings.push("no time given; defaulting to 8:00 PM".to_string());
            None
        }
    };
    let (h, m) = DEFAULT_SHOW_TIME;
    let time = time
        .or_else(|| NaiveTime::from_hms_opt(h, m, 0))
        .unwrap_or_default();
    let event_date = date.and_time(time).and_utc();

    let mut venues = Vec::new();
    let mut artists = Vec::new();
    let mut description_lines: Vec<&str> = Vec::new();
    let mut section = Section::None;

    for line in body.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            section = match heading.trim().to_lowercase().as_str() {
                "venue" | "venues" => Section::Venues,
                "artist" | "artists" | "lineup" => Section::Artists,
                "description" | "details" => Section::Description,
                other => {
                    warnings.push(format!("unknown section '{other}' ignored"));
                    Section::Unknown
                }
            };
            continue;
        }
        match section {
            Section::Description => description_lines.push(line),
            Section::Venues | Section::Artists if trimmed.is_empty() => {}
            Section::Venues | Section::Artists => {
                let Some(item) = list_item(trimmed) else {
                    warnings.push(format!("expected a '- ' list item, got {trimmed:?}"));
                    continue;
                };
                if section == Section::Venues {
                    venues.extend(parse_venue_line(item, &mut warnings));
                } else {
                    artists.extend(parse_artist_line(item, &mut warnings));
                }
            }
            Section::None | Section::Unknown => {}
        }
    }

    if venues.is_empty() {
        warnings.push("no venues listed; the show cannot be imported".to_string());
    }
    if artists.is_empty() {
        warnings.push(format!("no artists listed; billing {title:?} as the headliner"));
        artists.push(ParsedArtist {
            input: ArtistInput::named(title.clone()),
            is_headliner: true,
        });
    }

    let description = non_empty(&description_lines.join("\n"));
    Ok(ParsedShowImport {
        price: fm.price.as_deref().and_then(|p| parse_price(p, &mut warnings)),
        is_sold_out: parse_flag("sold_out", fm.sold_out.as_ref(), &mut warnings),
        is_cancelled: parse_flag("cancelled", fm.cancelled.as_ref(), &mut warnings),
        private: parse_flag("private", fm.private.as_ref(), &mut warnings),
        title,
        event_date,
        city: fm.city,
        state: fm.state,
        age_requirement: fm.age,
        ticket_url: fm.tickets,
        description,
        venues,
        artists,
        warnings,
    })
}

/// Writes a show back out in the layout [`parse`] reads.
#[must_use]
pub fn export(show: &ShowWithRelations) -> String {
    let s = &show.show;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{FENCE}");
    let _ = writeln!(out, "title: {}", quote(&s.title));
    let _ = writeln!(out, "date: {}", s.event_date.format("%Y-%m-%d"));
    let _ = writeln!(out, "time: {}", s.event_date.format("%H:%M"));
    let optional = [
        ("city", s.city.as_deref()),
        ("state", s.state.as_deref()),
        ("age", s.age_requirement.as_deref()),
        ("tickets", s.ticket_url.as_deref()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            let _ = writeln!(out, "{key}: {}", quote(value));
        }
    }
    if let Some(price) = s.price {
        let _ = writeln!(out, "price: {price}");
    }
    for (key, set) in [
        ("sold_out", s.is_sold_out),
        ("cancelled", s.is_cancelled),
        ("private", s.status == ShowStatus::Private),
    ] {
        if set {
            let _ = writeln!(out, "{key}: true");
        }
    }
    let _ = writeln!(out, "{FENCE}");

    out.push_str("\n## Venues\n");
    for v in &show.venues {
        let mut fields: Vec<String> = [
            Some(v.name.as_str()),
            Some(v.city.as_str()),
            Some(v.state.as_str()),
            v.address.as_deref(),
            v.zipcode.as_deref(),
        ]
        .into_iter()
        .map(|f| escape_field(f.unwrap_or_default()))
        .collect();
        while fields.len() > 3 && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        let _ = writeln!(out, "- {}", fields.join(" | "));
    }

    out.push_str("\n## Artists\n");
    for billed in &show.artists {
        let a = &billed.artist;
        let mut line = format!("- {}", escape_field(&a.name));
        if billed.is_headliner {
            line.push_str(" | headliner");
        }
        if let Some(url) = &a.bandcamp_url {
            let _ = write!(line, " | bandcamp: {}", escape_field(url));
        }
        if let Some(url) = &a.spotify_url {
            let _ = write!(line, " | spotify: {}", escape_field(url));
        }
        let _ = writeln!(out, "{line}");
    }

    if let Some(description) = &s.description {
        let _ = write!(out, "\n## Description\n{description}\n");
    }
    out
}
