//! Error types for changelog parsing and clearsigned framing.

/// Changelog parsing errors.
#[derive(Debug, thiserror::Error)]
pub enum ChangelogError {
    /// No stanza with both a header and a trailer line was found.
    #[error("no valid changelog stanza found")]
    Broken,

    /// The trailer date of the top stanza is not an RFC 2822 date.
    #[error("invalid changelog date {date:?}")]
    InvalidDate {
        date: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Errors while splitting a cleartext-signed document.
#[derive(Debug, thiserror::Error)]
pub enum ArmorError {
    #[error("missing {marker} marker")]
    MissingMarker { marker: &'static str },

    #[error("armor headers are not terminated by a blank line")]
    UnterminatedHeaders,
}
