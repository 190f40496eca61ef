//! Canonical URI values.
//!
//! A [`Uri`] is a cheap handle to a pooled, immutable record. The pool
//! guarantees at most one live record per distinct URI value, so equality
//! and hashing are pointer-cheap. Records never change after construction;
//! the rendered string form is computed lazily and cached.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::chars::{self, SCHEME_CHAR, SEGMENT_CHAR};

/// The component form of a pooled URI.
pub(crate) enum Repr {
    Hierarchical {
        scheme: Option<Arc<str>>,
        authority: Option<Arc<str>>,
        device: Option<Arc<str>>,
        absolute_path: bool,
        segments: Arc<[Arc<str>]>,
        query: Option<Arc<str>>,
    },
    Opaque {
        scheme: Arc<str>,
        opaque_part: Arc<str>,
    },
}

/// The pooled record behind a [`Uri`].
pub(crate) struct UriInner {
    /// Polynomial hash of the rendered string, composed from component
    /// hashes at construction time.
    pub(crate) hash: u32,
    pub(crate) repr: Repr,
    /// Lazily cached rendering. The string parser seeds this with its
    /// input when the input is already in canonical form.
    pub(crate) rendered: OnceLock<Box<str>>,
}

/// Whether `scheme` denotes an archive URI (`jar`, `zip`, or `archive`),
/// whose authority runs to the `!` separator and is not preceded by `//`.
#[inline]
pub(crate) fn is_archive_scheme(scheme: Option<&str>) -> bool {
    matches!(scheme, Some("jar" | "zip" | "archive"))
}

#[inline]
fn opt_ptr_eq(a: Option<&Arc<str>>, b: Option<&Arc<str>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

/// Advance `*i` past `part` if the bytes at `*i` equal it.
#[inline]
fn eat(bytes: &[u8], i: &mut usize, part: &str) -> bool {
    let part = part.as_bytes();
    match bytes.get(*i..*i + part.len()) {
        Some(region) if region == part => {
            *i += part.len();
            true
        }
        _ => false,
    }
}

#[inline]
fn eat_byte(bytes: &[u8], i: &mut usize, b: u8) -> bool {
    if bytes.get(*i) == Some(&b) {
        *i += 1;
        true
    } else {
        false
    }
}

impl UriInner {
    pub(crate) fn hierarchical(
        hash: u32,
        scheme: Option<Arc<str>>,
        authority: Option<Arc<str>>,
        device: Option<Arc<str>>,
        absolute_path: bool,
        segments: Arc<[Arc<str>]>,
        query: Option<Arc<str>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            hash,
            repr: Repr::Hierarchical { scheme, authority, device, absolute_path, segments, query },
            rendered: OnceLock::new(),
        })
    }

    pub(crate) fn opaque(hash: u32, scheme: Arc<str>, opaque_part: Arc<str>) -> Arc<Self> {
        Arc::new(Self { hash, repr: Repr::Opaque { scheme, opaque_part }, rendered: OnceLock::new() })
    }

    /// Render the canonical string form.
    fn render(&self) -> String {
        match &self.repr {
            Repr::Opaque { scheme, opaque_part } => {
                let mut out = String::with_capacity(scheme.len() + 1 + opaque_part.len());
                out.push_str(scheme);
                out.push(':');
                out.push_str(opaque_part);
                out
            }
            Repr::Hierarchical { scheme, authority, device, absolute_path, segments, query } => {
                let mut out = String::new();
                if let Some(scheme) = scheme {
                    out.push_str(scheme);
                    out.push(':');
                }
                if let Some(authority) = authority {
                    if !is_archive_scheme(scheme.as_deref()) {
                        out.push_str("//");
                    }
                    out.push_str(authority);
                }
                if let Some(device) = device {
                    out.push('/');
                    out.push_str(device);
                }
                if *absolute_path {
                    out.push('/');
                }
                for (index, segment) in segments.iter().enumerate() {
                    if index != 0 {
                        out.push('/');
                    }
                    out.push_str(segment);
                }
                if let Some(query) = query {
                    out.push('?');
                    out.push_str(query);
                }
                out
            }
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        self.rendered.get_or_init(|| self.render().into_boxed_str())
    }

    /// Component-wise comparison against a raw URI string, without
    /// allocating. Exact: a string that renders to this URI but is not in
    /// canonical form (an upper-cased scheme, say) does not match.
    pub(crate) fn matches_str(&self, s: &str) -> bool {
        let bytes = s.as_bytes();
        let mut i = 0usize;
        match &self.repr {
            Repr::Opaque { scheme, opaque_part } => {
                eat(bytes, &mut i, scheme)
                    && eat_byte(bytes, &mut i, b':')
                    && eat(bytes, &mut i, opaque_part)
                    && i == bytes.len()
            }
            Repr::Hierarchical { scheme, authority, device, absolute_path, segments, query } => {
                if let Some(scheme) = scheme {
                    if !eat(bytes, &mut i, scheme) || !eat_byte(bytes, &mut i, b':') {
                        return false;
                    }
                }
                if let Some(authority) = authority {
                    if !is_archive_scheme(scheme.as_deref())
                        && !(eat_byte(bytes, &mut i, b'/') && eat_byte(bytes, &mut i, b'/'))
                    {
                        return false;
                    }
                    if !eat(bytes, &mut i, authority) {
                        return false;
                    }
                }
                if let Some(device) = device {
                    if !eat_byte(bytes, &mut i, b'/') || !eat(bytes, &mut i, device) {
                        return false;
                    }
                }
                if *absolute_path && !eat_byte(bytes, &mut i, b'/') {
                    return false;
                }
                for (index, segment) in segments.iter().enumerate() {
                    if index != 0 && !eat_byte(bytes, &mut i, b'/') {
                        return false;
                    }
                    if !eat(bytes, &mut i, segment) {
                        return false;
                    }
                }
                if let Some(query) = query {
                    if !eat_byte(bytes, &mut i, b'?') || !eat(bytes, &mut i, query) {
                        return false;
                    }
                }
                i == bytes.len()
            }
        }
    }

    /// Comparison against a platform base segment and an encoded path with
    /// its leading `/`, as produced by the platform path parser.
    pub(crate) fn matches_platform(&self, base: &str, encoded_path: &str) -> bool {
        match &self.repr {
            Repr::Hierarchical {
                scheme: Some(scheme),
                authority: None,
                device: None,
                absolute_path: true,
                segments,
                query: None,
            } if &**scheme == "platform" => {
                let Some((first, rest)) = segments.split_first() else {
                    return false;
                };
                if &**first != base {
                    return false;
                }
                let bytes = encoded_path.as_bytes();
                let mut i = 0usize;
                for segment in rest {
                    if !eat_byte(bytes, &mut i, b'/') || !eat(bytes, &mut i, segment) {
                        return false;
                    }
                }
                i == bytes.len()
            }
            _ => false,
        }
    }

    /// Comparison against canonical components from the same pool, so
    /// every part compares by pointer.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn matches_components(
        &self,
        hierarchical: bool,
        scheme: Option<&Arc<str>>,
        authority: Option<&Arc<str>>,
        device: Option<&Arc<str>>,
        absolute_path: bool,
        segments: &Arc<[Arc<str>]>,
        query: Option<&Arc<str>>,
    ) -> bool {
        match &self.repr {
            Repr::Hierarchical {
                scheme: s,
                authority: a,
                device: d,
                absolute_path: ap,
                segments: segs,
                query: q,
            } => {
                hierarchical
                    && *ap == absolute_path
                    && opt_ptr_eq(s.as_ref(), scheme)
                    && opt_ptr_eq(a.as_ref(), authority)
                    && opt_ptr_eq(d.as_ref(), device)
                    && Arc::ptr_eq(segs, segments)
                    && opt_ptr_eq(q.as_ref(), query)
            }
            Repr::Opaque { scheme: s, opaque_part } => {
                !hierarchical
                    && opt_ptr_eq(Some(s), scheme)
                    && opt_ptr_eq(Some(opaque_part), authority)
            }
        }
    }
}

/// An immutable, canonicalized URI.
///
/// Obtained from a [`UriPool`](crate::UriPool); cloning is one reference
/// count. Two `Uri`s from the same pool are equal iff they are the same
/// object. URIs from different pools never compare equal, even when their
/// rendered forms coincide.
#[derive(Clone)]
pub struct Uri(pub(crate) Arc<UriInner>);

impl Uri {
    /// The canonical string form, rendered on first use and cached.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }

    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        match &self.0.repr {
            Repr::Hierarchical { scheme, .. } => scheme.as_deref(),
            Repr::Opaque { scheme, .. } => Some(scheme),
        }
    }

    /// The authority, for hierarchical URIs that have one. An archive
    /// URI's authority includes its trailing `!`.
    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        match &self.0.repr {
            Repr::Hierarchical { authority, .. } => authority.as_deref(),
            Repr::Opaque { .. } => None,
        }
    }

    /// The device component, including its trailing `:`.
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        match &self.0.repr {
            Repr::Hierarchical { device, .. } => device.as_deref(),
            Repr::Opaque { .. } => None,
        }
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        match &self.0.repr {
            Repr::Hierarchical { query, .. } => query.as_deref(),
            Repr::Opaque { .. } => None,
        }
    }

    #[must_use]
    pub fn opaque_part(&self) -> Option<&str> {
        match &self.0.repr {
            Repr::Opaque { opaque_part, .. } => Some(opaque_part),
            Repr::Hierarchical { .. } => None,
        }
    }

    /// The canonical segment array. Empty for opaque URIs.
    #[must_use]
    pub fn segments(&self) -> &[Arc<str>] {
        match &self.0.repr {
            Repr::Hierarchical { segments, .. } => segments,
            Repr::Opaque { .. } => &[],
        }
    }

    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments().get(index).map(|s| &**s)
    }

    #[must_use]
    pub fn segment_count(&self) -> usize { self.segments().len() }

    #[must_use]
    pub fn last_segment(&self) -> Option<&str> { self.segments().last().map(|s| &**s) }

    #[must_use]
    pub fn is_hierarchical(&self) -> bool {
        matches!(self.0.repr, Repr::Hierarchical { .. })
    }

    #[must_use]
    pub fn is_opaque(&self) -> bool { matches!(self.0.repr, Repr::Opaque { .. }) }

    /// Whether this is a relative reference: hierarchical with no scheme.
    #[must_use]
    pub fn is_relative(&self) -> bool {
        matches!(&self.0.repr, Repr::Hierarchical { scheme: None, .. })
    }

    #[must_use]
    pub fn has_absolute_path(&self) -> bool {
        matches!(&self.0.repr, Repr::Hierarchical { absolute_path: true, .. })
    }

    #[must_use]
    pub fn has_authority(&self) -> bool {
        matches!(&self.0.repr, Repr::Hierarchical { authority: Some(_), .. })
    }

    #[must_use]
    pub fn has_device(&self) -> bool {
        matches!(&self.0.repr, Repr::Hierarchical { device: Some(_), .. })
    }

    #[must_use]
    pub fn has_query(&self) -> bool {
        matches!(&self.0.repr, Repr::Hierarchical { query: Some(_), .. })
    }

    #[must_use]
    pub fn is_archive(&self) -> bool { is_archive_scheme(self.scheme()) }

    #[must_use]
    pub fn is_file(&self) -> bool { self.is_hierarchical() && self.scheme() == Some("file") }

    #[must_use]
    pub fn is_platform(&self) -> bool {
        self.is_hierarchical() && self.scheme() == Some("platform")
    }

    #[must_use]
    pub fn is_platform_resource(&self) -> bool {
        self.is_platform() && self.segment(0) == Some("resource")
    }

    #[must_use]
    pub fn is_platform_plugin(&self) -> bool {
        self.is_platform() && self.segment(0) == Some("plugin")
    }

    /// Whether this is the empty relative URI, the result of parsing `""`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(
            &self.0.repr,
            Repr::Hierarchical {
                scheme: None,
                authority: None,
                device: None,
                absolute_path: false,
                segments,
                query: None,
            } if segments.is_empty()
        )
    }
}

impl PartialEq for Uri {
    /// Pointer equality; valid because the pool keeps at most one live
    /// instance per value.
    #[inline]
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl Eq for Uri {}

impl std::hash::Hash for Uri {
    /// The content hash stored at construction; consistent with `Eq`
    /// since equal pointers carry equal hashes.
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) { state.write_u32(self.0.hash); }
}

impl PartialEq<str> for Uri {
    #[inline]
    fn eq(&self, other: &str) -> bool { self.as_str() == other }
}

impl PartialEq<&str> for Uri {
    #[inline]
    fn eq(&self, other: &&str) -> bool { self.as_str() == *other }
}

impl fmt::Display for Uri {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl fmt::Debug for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::Uri;
    use serde_core::{Serialize, Serializer};

    /// Serializes as the rendered string. There is no `Deserialize`; a
    /// `Uri` only exists relative to a pool.
    impl Serialize for Uri {
        #[inline]
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: Serializer {
            self.as_str().serialize(serializer)
        }
    }
}

/// Whether `value` is an acceptable scheme. `None` (no scheme) is valid.
#[must_use]
pub fn valid_scheme(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => s.bytes().all(|b| SCHEME_CHAR.contains(b)),
    }
}

/// Whether `value` is an acceptable opaque part: non-empty, not starting
/// with `/`, and free of the fragment separator.
#[must_use]
pub fn valid_opaque_part(value: &str) -> bool {
    !value.is_empty()
        && !value.as_bytes().starts_with(&[chars::SEGMENT_SEPARATOR])
        && !value.bytes().any(|b| b == chars::FRAGMENT_SEPARATOR)
}

/// Whether `value` is an acceptable authority. `None` is valid.
#[must_use]
pub fn valid_authority(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => !s.bytes().any(|b| {
            b == chars::SEGMENT_SEPARATOR
                || b == chars::QUERY_SEPARATOR
                || b == chars::FRAGMENT_SEPARATOR
        }),
    }
}

/// Whether `value` is an acceptable device: ends with `:` and contains no
/// structural separators. `None` is valid.
#[must_use]
pub fn valid_device(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => {
            s.as_bytes().last() == Some(&chars::DEVICE_IDENTIFIER) && valid_authority(Some(s))
        }
    }
}

/// Whether `value` is an acceptable segment: only segment characters,
/// with `%` standing for percent-escapes.
#[must_use]
pub fn valid_segment(value: &str) -> bool { value.bytes().all(|b| SEGMENT_CHAR.contains(b)) }

#[must_use]
pub fn valid_segments(values: &[&str]) -> bool { values.iter().all(|s| valid_segment(s)) }

/// Whether `value` is an acceptable query: anything without the fragment
/// separator. `None` is valid.
#[must_use]
pub fn valid_query(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => !s.bytes().any(|b| b == chars::FRAGMENT_SEPARATOR),
    }
}
