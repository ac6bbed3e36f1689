//! Debian changelog stanza parsing.
//!
//! A `debian/changelog` is a sequence of stanzas, newest first:
//!
//! ```text
//! hello (2.10-3) unstable; urgency=medium
//!
//!   * Free-text body.
//!
//!  -- Jane Doe <jane@debian.org>  Sun, 01 Jan 2023 12:00:00 +0000
//! ```
//!
//! Anything the parser does not recognise ends the usable part of the
//! document instead of failing, as long as the top stanza is complete.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, LazyLock};

use crate::diagnostics::{Diagnostics, tracing_diagnostics};
use crate::error::ChangelogError;

static VERSION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9+.-]*\s+\(([^ ]+)\)").expect("version line regex")
});

static AUTHOR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ --\s*([^<>]*<[^<>]+>)  (.*)$").expect("author line regex")
});

/// Lines after which nothing is changelog history any more.
const TERMINATORS: [&str; 2] = ["Local variables:", "Old Changelog:"];

/// Author and date of the newest stanza, with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopEntry {
    pub author: String,
    pub date: DateTime<FixedOffset>,
    pub version: String,
}

/// Author and date of the newest stanza, with every version seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogHistory {
    pub author: String,
    pub date: DateTime<FixedOffset>,
    /// Newest first. Repeated versions are kept as they appear.
    pub versions: Vec<String>,
}

/// Outcome of [`ChangelogParser::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult {
    /// Only the top stanza was requested.
    Top(TopEntry),
    /// The whole usable history was requested.
    History(ChangelogHistory),
}

impl ParseResult {
    pub fn author(&self) -> &str {
        match self {
            ParseResult::Top(top) => &top.author,
            ParseResult::History(history) => &history.author,
        }
    }

    pub fn date(&self) -> DateTime<FixedOffset> {
        match self {
            ParseResult::Top(top) => top.date,
            ParseResult::History(history) => history.date,
        }
    }

    /// Version of the newest stanza.
    pub fn top_version(&self) -> &str {
        match self {
            ParseResult::Top(top) => &top.version,
            ParseResult::History(history) => &history.versions[0],
        }
    }
}

/// Line-oriented changelog parser.
#[derive(Clone)]
pub struct ChangelogParser {
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for ChangelogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangelogParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangelogParser").finish_non_exhaustive()
    }
}

impl ChangelogParser {
    /// Parser reporting through `tracing`.
    pub fn new() -> Self {
        Self {
            diagnostics: tracing_diagnostics(),
        }
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { diagnostics }
    }

    /// Parse changelog `lines`.
    ///
    /// Parsing stops at a terminator line, at the first line that is neither
    /// blank nor a stanza header where a header is expected, or at the header
    /// of a non-top stanza whose version is in `skip_versions` (that version
    /// is still recorded). With `just_one`, returns as soon as the top
    /// stanza's trailer has been read.
    ///
    /// Fails with [`ChangelogError::Broken`] when the top stanza has no
    /// trailer line.
    #[tracing::instrument(skip_all, fields(skip = skip_versions.len(), just_one = just_one))]
    pub fn parse<I, S, V>(
        &self,
        lines: I,
        skip_versions: &HashSet<V>,
        just_one: bool,
    ) -> Result<ParseResult, ChangelogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        V: Borrow<str> + Eq + Hash,
    {
        let mut top_entry = true;
        let mut within = false;
        let mut versions: Vec<String> = Vec::new();
        let mut top: Option<(String, DateTime<FixedOffset>)> = None;

        for line in lines {
            let line = line.as_ref().trim_end();
            if line.is_empty() {
                continue;
            }

            if !within {
                if TERMINATORS.contains(&line) {
                    self.diagnostics
                        .debug(&format!("Changelog history ends at {line:?}"));
                    break;
                }
                let Some(caps) = VERSION_LINE_RE.captures(line) else {
                    self.diagnostics
                        .warn(&format!("Giving up on changelog {line:?}"));
                    break;
                };
                let version = &caps[1];
                versions.push(version.to_string());
                if !top_entry && skip_versions.contains(version) {
                    self.diagnostics
                        .debug(&format!("Stopping at already known version {version}"));
                    break;
                }
                within = true;
            } else {
                let Some(caps) = AUTHOR_LINE_RE.captures(line) else {
                    continue;
                };
                if top_entry {
                    let author = caps[1].to_string();
                    let date = parse_date(&caps[2])?;
                    if just_one {
                        let version =
                            versions.into_iter().next().ok_or(ChangelogError::Broken)?;
                        return Ok(ParseResult::Top(TopEntry {
                            author,
                            date,
                            version,
                        }));
                    }
                    top = Some((author, date));
                }
                top_entry = false;
                within = false;
            }
        }

        let Some((author, date)) = top else {
            return Err(ChangelogError::Broken);
        };
        tracing::debug!(count = versions.len(), "Parsed changelog history");
        Ok(ParseResult::History(ChangelogHistory {
            author,
            date,
            versions,
        }))
    }

    /// Full history, stopping at the first already known version below the top.
    pub fn parse_history<I, S, V>(
        &self,
        lines: I,
        skip_versions: &HashSet<V>,
    ) -> Result<ChangelogHistory, ChangelogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        V: Borrow<str> + Eq + Hash,
    {
        match self.parse(lines, skip_versions, false)? {
            ParseResult::History(history) => Ok(history),
            ParseResult::Top(_) => unreachable!("full parse returned a single entry"),
        }
    }

    /// Author, date and version of the top stanza only.
    pub fn parse_top<I, S>(&self, lines: I) -> Result<TopEntry, ChangelogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self.parse(lines, &HashSet::<String>::new(), true)? {
            ParseResult::Top(top) => Ok(top),
            // Parsing ended without a top trailer would have been `Broken`.
            ParseResult::History(_) => unreachable!("single-entry parse returned a history"),
        }
    }
}

/// Parse with the default `tracing` diagnostics.
pub fn parse_changelog<I, S, V>(
    lines: I,
    skip_versions: &HashSet<V>,
    just_one: bool,
) -> Result<ParseResult, ChangelogError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    V: Borrow<str> + Eq + Hash,
{
    ChangelogParser::new().parse(lines, skip_versions, just_one)
}

/// RFC 2822 date, ignoring a trailing `(comment)` such as `(CET)` and the
/// day-of-week name, which need not match the calendar date.
fn parse_date(raw: &str) -> Result<DateTime<FixedOffset>, ChangelogError> {
    let mut date = raw.trim();
    if date.ends_with(')')
        && let Some(open) = date.rfind('(')
    {
        date = date[..open].trim_end();
    }
    if let Some((day, rest)) = date.split_once(',')
        && !day.is_empty()
        && day.chars().all(|c| c.is_ascii_alphabetic())
    {
        date = rest.trim_start();
    }
    DateTime::parse_from_rfc2822(date).map_err(|source| ChangelogError::InvalidDate {
        date: raw.to_string(),
        source,
    })
}
