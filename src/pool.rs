//! The URI cache context: one string pool, one segment-array pool, and one
//! URI pool, plus the scratch queues and pre-interned well-known strings
//! the parsers lean on.
//!
//! All canonicalization is relative to a [`UriPool`] value; there are no
//! process-wide tables. Two pools never share instances, so pointer
//! equality between their URIs is meaningless across pools.

use std::{convert::Infallible, sync::Arc};

use weak_pool::{AccessUnit, Pool, ScratchQueue};

use crate::{
    chars::hash_bytes,
    components,
    error::UriError,
    file::{FileUnit, PathScratch},
    parse,
    platform::PlatformUnit,
    uri::{Uri, UriInner},
};

pub(crate) const SCHEME_PLATFORM_HASH: u32 = hash_bytes(0, b"platform");
pub(crate) const SCHEME_FILE_HASH: u32 = hash_bytes(0, b"file");
pub(crate) const SCHEME_HTTP_HASH: u32 = hash_bytes(0, b"http");
pub(crate) const SCHEME_JAR_HASH: u32 = hash_bytes(0, b"jar");
pub(crate) const SCHEME_ZIP_HASH: u32 = hash_bytes(0, b"zip");
pub(crate) const SCHEME_ARCHIVE_HASH: u32 = hash_bytes(0, b"archive");

pub(crate) const SEGMENT_RESOURCE_HASH: u32 = hash_bytes(0, b"resource");
pub(crate) const SEGMENT_PLUGIN_HASH: u32 = hash_bytes(0, b"plugin");

/// Hash of `"//"`, the authority prefix.
pub(crate) const AUTHORITY_SEPARATOR_HASH: u32 = hash_bytes(0, b"//");

/// Unwrap a `Result` whose error type is uninhabited.
#[inline]
pub(crate) fn infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// How native path strings are interpreted by the file path parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStyle {
    /// `/`-separated; a path is absolute iff it starts with `/`.
    Posix,
    /// `\`-separated (with `/` accepted); a path is absolute iff it
    /// starts with a drive letter and separator (`C:\` or `C:/`) or a
    /// doubled separator (UNC).
    Windows,
}

impl PathStyle {
    /// The style of the compiling host.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }

    #[inline]
    pub(crate) const fn separator(self) -> u8 {
        match self {
            Self::Posix => b'/',
            Self::Windows => b'\\',
        }
    }

    pub(crate) fn is_absolute(self, path: &str) -> bool {
        let bytes = path.as_bytes();
        match self {
            Self::Posix => bytes.first() == Some(&b'/'),
            Self::Windows => match bytes {
                [b'\\', b'\\', ..] | [b'/', b'/', ..] => true,
                [drive, b':', sep, ..] => {
                    drive.is_ascii_alphabetic() && (*sep == b'/' || *sep == b'\\')
                }
                _ => false,
            },
        }
    }
}

/// Strings every pool needs, interned once and held strongly so they can
/// never be evicted.
pub(crate) struct WellKnown {
    pub(crate) platform: Arc<str>,
    pub(crate) file: Arc<str>,
    pub(crate) http: Arc<str>,
    pub(crate) jar: Arc<str>,
    pub(crate) zip: Arc<str>,
    pub(crate) archive: Arc<str>,
    pub(crate) resource: Arc<str>,
    pub(crate) plugin: Arc<str>,
}

/// A canonicalizing cache of URI values.
///
/// Construction goes through one of three front doors: string parsing
/// ([`parse`](Self::parse)), native path parsing
/// ([`file_uri`](Self::file_uri), [`platform_resource`](Self::platform_resource),
/// [`platform_plugin`](Self::platform_plugin)), or explicit components
/// ([`hierarchical`](Self::hierarchical), [`opaque`](Self::opaque),
/// [`with_query`](Self::with_query)). Whatever the door, equal values come
/// back as the same instance for as long as any owner keeps them alive.
pub struct UriPool {
    pub(crate) strings: Pool<str>,
    pub(crate) arrays: Pool<[Arc<str>]>,
    pub(crate) uris: Pool<UriInner>,
    pub(crate) empty_segments: Arc<[Arc<str>]>,
    pub(crate) well_known: WellKnown,
    pub(crate) path_style: PathStyle,
    path_scratch: ScratchQueue<PathScratch>,
}

impl Default for UriPool {
    fn default() -> Self { Self::new() }
}

impl UriPool {
    #[must_use]
    pub fn new() -> Self { Self::with_path_style(PathStyle::host()) }

    #[must_use]
    pub fn with_path_style(path_style: PathStyle) -> Self {
        let strings = Pool::<str>::new();
        let arrays = Pool::<[Arc<str>]>::new();
        let intern = |s: &str| {
            infallible(strings.intern(&mut StrUnit { value: s, hash: hash_bytes(0, s.as_bytes()) }))
        };
        let well_known = WellKnown {
            platform: intern("platform"),
            file: intern("file"),
            http: intern("http"),
            jar: intern("jar"),
            zip: intern("zip"),
            archive: intern("archive"),
            resource: intern("resource"),
            plugin: intern("plugin"),
        };
        let empty_segments =
            infallible(arrays.intern(&mut SegmentsUnit { segments: &[], hash: 1 }));
        Self {
            strings,
            arrays,
            uris: Pool::new(),
            empty_segments,
            well_known,
            path_style,
            path_scratch: ScratchQueue::new(),
        }
    }

    /// Parse a full URI string. The string must not carry a fragment; `#`
    /// is treated as ordinary content here.
    pub fn parse(&self, input: &str) -> Result<Uri, UriError> { parse::parse(self, input) }

    /// Canonicalize a native file path as a `file:` URI (or a relative
    /// URI when the path is not absolute), percent-encoding as needed.
    /// Never fails; every byte has an encoded form.
    #[must_use]
    pub fn file_uri(&self, path: &str) -> Uri {
        let mut scratch = self.path_scratch.checkout();
        let mut unit = FileUnit::prepare(self, &mut scratch, path);
        Uri(infallible(self.uris.intern(&mut unit)))
    }

    /// Canonicalize a workspace path as `platform:/resource/...`. With
    /// `encode`, everything outside the segment character set is escaped;
    /// without it, only structure-corrupting characters are.
    #[must_use]
    pub fn platform_resource(&self, path: &str, encode: bool) -> Uri {
        let mut scratch = self.path_scratch.checkout();
        let mut unit = PlatformUnit::prepare(self, &mut scratch, true, path, encode);
        Uri(infallible(self.uris.intern(&mut unit)))
    }

    /// Canonicalize a plugin path as `platform:/plugin/...`.
    #[must_use]
    pub fn platform_plugin(&self, path: &str, encode: bool) -> Uri {
        let mut scratch = self.path_scratch.checkout();
        let mut unit = PlatformUnit::prepare(self, &mut scratch, false, path, encode);
        Uri(infallible(self.uris.intern(&mut unit)))
    }

    /// Build a hierarchical URI from explicit components, validating every
    /// one of them. The scheme is lower-cased. Archive schemes require an
    /// archive authority and no device. The path is made absolute whenever
    /// an authority or device precedes a non-empty path, and for archive
    /// schemes always; a relative rendering of those shapes would not
    /// parse back to the same components.
    pub fn hierarchical(
        &self,
        scheme: Option<&str>,
        authority: Option<&str>,
        device: Option<&str>,
        absolute_path: bool,
        segments: &[&str],
        query: Option<&str>,
    ) -> Result<Uri, UriError> {
        components::hierarchical(self, scheme, authority, device, absolute_path, segments, query)
    }

    /// Build a relative URI from segments and an optional query.
    pub fn relative(
        &self,
        absolute_path: bool,
        segments: &[&str],
        query: Option<&str>,
    ) -> Result<Uri, UriError> {
        components::hierarchical(self, None, None, None, absolute_path, segments, query)
    }

    /// Build an opaque URI. The scheme is required and must not be an
    /// archive scheme.
    pub fn opaque(&self, scheme: &str, opaque_part: &str) -> Result<Uri, UriError> {
        components::opaque(self, scheme, opaque_part)
    }

    /// Replace the query of a hierarchical URI, validating only the query.
    /// `None` removes it. `uri` may come from a different pool; the result
    /// always belongs to this one.
    pub fn with_query(&self, uri: &Uri, query: Option<&str>) -> Result<Uri, UriError> {
        components::with_query(self, uri, query)
    }

    /// Whether `value` can serve as the authority of an archive URI: a
    /// trailing `!` preceded by a string that itself parses as a URI.
    #[must_use]
    pub fn valid_archive_authority(&self, value: &str) -> bool {
        match value.as_bytes().split_last() {
            Some((&b'!', head)) => {
                // SAFETY: '!' is ASCII, so the split is on a char boundary.
                let head = unsafe { std::str::from_utf8_unchecked(head) };
                self.parse(head).is_ok()
            }
            _ => false,
        }
    }

    // ---- string pool -----------------------------------------------------

    pub(crate) fn intern_str(&self, value: &str) -> Arc<str> {
        self.intern_str_hashed(value, hash_bytes(0, value.as_bytes()))
    }

    pub(crate) fn intern_str_hashed(&self, value: &str, hash: u32) -> Arc<str> {
        infallible(self.strings.intern(&mut StrUnit { value, hash }))
    }

    /// Intern a byte range of a scratch buffer with its precomputed hash.
    pub(crate) fn intern_buf(&self, bytes: &[u8], hash: u32) -> Arc<str> {
        infallible(self.strings.intern(&mut BufUnit { bytes, hash }))
    }

    /// Intern the ASCII-lower-cased form of `value`, avoiding the copy
    /// when it is already lower-cased.
    pub(crate) fn intern_lower(&self, value: &str) -> Arc<str> {
        if value.bytes().any(|b| b.is_ascii_uppercase()) {
            self.intern_str(&value.to_ascii_lowercase())
        } else {
            self.intern_str(value)
        }
    }

    // ---- segment-array pool ----------------------------------------------

    /// Intern a slice of canonical segments. `hash` is the array hash:
    /// seed 1, folded as `31*h + segment_hash` per element.
    pub(crate) fn intern_segments(&self, segments: &[Arc<str>], hash: u32) -> Arc<[Arc<str>]> {
        if segments.is_empty() {
            return self.empty_segments.clone();
        }
        infallible(self.arrays.intern(&mut SegmentsUnit { segments, hash }))
    }

    /// Intern `base` extended by one segment, rehashing nothing but the
    /// addition. `hash` is the array hash of the extended array.
    pub(crate) fn append_segment(
        &self,
        base: &Arc<[Arc<str>]>,
        segment: &Arc<str>,
        hash: u32,
    ) -> Arc<[Arc<str>]> {
        infallible(self.arrays.intern(&mut AppendUnit { base, segment, hash }))
    }
}

/// Whole-string access into the string pool.
struct StrUnit<'a> {
    value: &'a str,
    hash: u32,
}

impl AccessUnit<str> for StrUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    #[inline]
    fn matches(&self, value: &str) -> bool {
        // Length first; the common miss is a hash collision of unequal
        // lengths.
        value.len() == self.value.len() && value == self.value
    }

    fn materialize(&mut self) -> Result<Arc<str>, Infallible> { Ok(Arc::from(self.value)) }
}

/// Scratch-buffer-range access into the string pool. The range is always
/// UTF-8: buffers hold UTF-8 input bytes with ASCII-only substitutions,
/// split at ASCII separators.
struct BufUnit<'a> {
    bytes: &'a [u8],
    hash: u32,
}

impl BufUnit<'_> {
    #[inline]
    fn as_str(&self) -> &str {
        // SAFETY: see type docs; the range never splits a multi-byte char.
        unsafe { std::str::from_utf8_unchecked(self.bytes) }
    }
}

impl AccessUnit<str> for BufUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    #[inline]
    fn matches(&self, value: &str) -> bool { value.as_bytes() == self.bytes }

    fn materialize(&mut self) -> Result<Arc<str>, Infallible> { Ok(Arc::from(self.as_str())) }
}

/// Slice access into the segment-array pool. Elements are canonical, so
/// comparison is pointer-wise.
struct SegmentsUnit<'a> {
    segments: &'a [Arc<str>],
    hash: u32,
}

impl AccessUnit<[Arc<str>]> for SegmentsUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    fn matches(&self, value: &[Arc<str>]) -> bool {
        value.len() == self.segments.len()
            && value.iter().zip(self.segments).all(|(a, b)| Arc::ptr_eq(a, b))
    }

    fn materialize(&mut self) -> Result<Arc<[Arc<str>]>, Infallible> {
        Ok(self.segments.to_vec().into())
    }
}

/// Append-one access into the segment-array pool: an existing canonical
/// array plus one more segment, without rehashing the prefix.
struct AppendUnit<'a> {
    base: &'a [Arc<str>],
    segment: &'a Arc<str>,
    hash: u32,
}

impl AccessUnit<[Arc<str>]> for AppendUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    fn matches(&self, value: &[Arc<str>]) -> bool {
        value.len() == self.base.len() + 1
            && value[..self.base.len()].iter().zip(self.base).all(|(a, b)| Arc::ptr_eq(a, b))
            && value.last().is_some_and(|last| Arc::ptr_eq(last, self.segment))
    }

    fn materialize(&mut self) -> Result<Arc<[Arc<str>]>, Infallible> {
        let mut extended = Vec::with_capacity(self.base.len() + 1);
        extended.extend(self.base.iter().cloned());
        extended.push(self.segment.clone());
        Ok(extended.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_strings_are_canonical() {
        let pool = UriPool::with_path_style(PathStyle::Posix);
        let file = pool.intern_str("file");
        assert!(Arc::ptr_eq(&file, &pool.well_known.file));
        let platform = pool.intern_lower("PLATFORM");
        assert!(Arc::ptr_eq(&platform, &pool.well_known.platform));
    }

    #[test]
    fn intern_lower_skips_copy_when_already_lower() {
        let pool = UriPool::with_path_style(PathStyle::Posix);
        let a = pool.intern_str("already-lower");
        let b = pool.intern_lower("already-lower");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn append_segment_shares_instances() {
        let pool = UriPool::with_path_style(PathStyle::Posix);
        let a = pool.intern_str("a");
        let b = pool.intern_str("b");
        let ha = hash_bytes(0, b"a");
        let hb = hash_bytes(0, b"b");

        let hash_one = 31 + ha;
        let hash_two = hash_one.wrapping_mul(31).wrapping_add(hb);
        let one = pool.append_segment(&pool.empty_segments.clone(), &a, hash_one);
        let two = pool.append_segment(&one, &b, hash_two);
        assert_eq!(two.len(), 2);

        // The same array built from a plain slice is the same instance.
        let again = pool.intern_segments(&[a.clone(), b.clone()], hash_two);
        assert!(Arc::ptr_eq(&two, &again));
    }

    #[test]
    fn empty_segment_array_is_shared() {
        let pool = UriPool::with_path_style(PathStyle::Posix);
        let empty = pool.intern_segments(&[], 1);
        assert!(Arc::ptr_eq(&empty, &pool.empty_segments));
    }

    #[test]
    fn path_style_absoluteness() {
        assert!(PathStyle::Posix.is_absolute("/tmp/x"));
        assert!(!PathStyle::Posix.is_absolute("tmp/x"));
        assert!(!PathStyle::Posix.is_absolute(""));

        assert!(PathStyle::Windows.is_absolute("C:\\Users"));
        assert!(PathStyle::Windows.is_absolute("c:/users"));
        assert!(PathStyle::Windows.is_absolute("\\\\server\\share"));
        assert!(PathStyle::Windows.is_absolute("//server/share"));
        assert!(!PathStyle::Windows.is_absolute("C:"));
        assert!(!PathStyle::Windows.is_absolute("\\relative"));
        assert!(!PathStyle::Windows.is_absolute("tmp\\x"));
    }
}
