use std::fmt;

/// Errors reported while parsing or constructing URIs.
///
/// Every variant corresponds to malformed caller input; internal pool
/// invariants are never surfaced here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// An archive-scheme URI string contained no `!/` separator.
    MissingArchiveSeparator(String),
    InvalidScheme(String),
    InvalidOpaquePart(String),
    InvalidAuthority(String),
    /// The authority of an archive-scheme URI must itself be a valid URI
    /// followed by `!`.
    InvalidArchiveAuthority(String),
    InvalidDevice(String),
    InvalidSegment(String),
    InvalidQuery(String),
}

impl UriError {
    #[inline]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::MissingArchiveSeparator(_) => "missing_archive_separator",
            Self::InvalidScheme(_) => "invalid_scheme",
            Self::InvalidOpaquePart(_) => "invalid_opaque_part",
            Self::InvalidAuthority(_) => "invalid_authority",
            Self::InvalidArchiveAuthority(_) => "invalid_archive_authority",
            Self::InvalidDevice(_) => "invalid_device",
            Self::InvalidSegment(_) => "invalid_segment",
            Self::InvalidQuery(_) => "invalid_query",
        }
    }
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArchiveSeparator(uri) => write!(f, "no archive separator in '{uri}'"),
            Self::InvalidScheme(value) => write!(f, "invalid scheme: '{value}'"),
            Self::InvalidOpaquePart(value) => write!(f, "invalid opaque part: '{value}'"),
            Self::InvalidAuthority(value) => write!(f, "invalid authority: '{value}'"),
            Self::InvalidArchiveAuthority(value) => {
                write!(f, "invalid archive authority: '{value}'")
            }
            Self::InvalidDevice(value) => write!(f, "invalid device: '{value}'"),
            Self::InvalidSegment(value) => write!(f, "invalid segment: '{value}'"),
            Self::InvalidQuery(value) => write!(f, "invalid query: '{value}'"),
        }
    }
}

impl std::error::Error for UriError {}
