//! Construction of URIs from explicit, caller-supplied components.
//!
//! Everything here validates first and interns second: by the time the
//! URI pool's lock is touched, every component string has been checked
//! and canonicalized, so the pool only ever sees well-formed values.

use std::{convert::Infallible, sync::Arc};

use weak_pool::AccessUnit;

use crate::{
    chars::{extend_hash, hash_byte, hash_bytes},
    error::UriError,
    pool::{AUTHORITY_SEPARATOR_HASH, UriPool, infallible},
    uri::{
        Repr, Uri, UriInner, is_archive_scheme, valid_authority, valid_device, valid_opaque_part,
        valid_query, valid_scheme, valid_segment,
    },
};

/// Hash of a URI rendered from components, identical to hashing the
/// rendered string byte by byte. For opaque URIs `authority_or_opaque`
/// carries the opaque part.
pub(crate) fn compose_hash(
    hierarchical: bool,
    scheme: Option<&str>,
    authority_or_opaque: Option<&str>,
    device: Option<&str>,
    absolute_path: bool,
    segments: &[Arc<str>],
    query: Option<&str>,
) -> u32 {
    let mut h = 0u32;
    if let Some(scheme) = scheme {
        h = hash_byte(hash_bytes(0, scheme.as_bytes()), b':');
    }
    if !hierarchical {
        let opaque = authority_or_opaque.unwrap_or_default();
        return extend_hash(h, hash_bytes(0, opaque.as_bytes()), opaque.len());
    }
    if let Some(authority) = authority_or_opaque {
        if !is_archive_scheme(scheme) {
            h = h.wrapping_mul(961).wrapping_add(AUTHORITY_SEPARATOR_HASH);
        }
        h = extend_hash(h, hash_bytes(0, authority.as_bytes()), authority.len());
    }
    if let Some(device) = device {
        h = hash_byte(h, b'/');
        h = extend_hash(h, hash_bytes(0, device.as_bytes()), device.len());
    }
    if absolute_path {
        h = hash_byte(h, b'/');
    }
    for (index, segment) in segments.iter().enumerate() {
        if index != 0 {
            h = hash_byte(h, b'/');
        }
        h = extend_hash(h, hash_bytes(0, segment.as_bytes()), segment.len());
    }
    if let Some(query) = query {
        h = hash_byte(h, b'?');
        h = extend_hash(h, hash_bytes(0, query.as_bytes()), query.len());
    }
    h
}

/// Fully canonicalized components, ready to be looked up or materialized.
/// Every `Arc` is already interned in the owning pool's string and array
/// pools, so matching is pointer comparison throughout.
pub(crate) struct CanonicalUnit {
    hash: u32,
    hierarchical: bool,
    scheme: Option<Arc<str>>,
    /// The opaque part when `!hierarchical`.
    authority: Option<Arc<str>>,
    device: Option<Arc<str>>,
    absolute_path: bool,
    segments: Arc<[Arc<str>]>,
    query: Option<Arc<str>>,
}

impl CanonicalUnit {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn hierarchical(
        hash: u32,
        scheme: Option<Arc<str>>,
        authority: Option<Arc<str>>,
        device: Option<Arc<str>>,
        absolute_path: bool,
        segments: Arc<[Arc<str>]>,
        query: Option<Arc<str>>,
    ) -> Self {
        Self {
            hash,
            hierarchical: true,
            scheme,
            authority,
            device,
            absolute_path,
            segments,
            query,
        }
    }

    pub(crate) fn opaque(
        hash: u32,
        scheme: Arc<str>,
        opaque_part: Arc<str>,
        empty_segments: Arc<[Arc<str>]>,
    ) -> Self {
        Self {
            hash,
            hierarchical: false,
            scheme: Some(scheme),
            authority: Some(opaque_part),
            device: None,
            absolute_path: false,
            segments: empty_segments,
            query: None,
        }
    }
}

impl AccessUnit<UriInner> for CanonicalUnit {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    fn matches(&self, value: &UriInner) -> bool {
        value.matches_components(
            self.hierarchical,
            self.scheme.as_ref(),
            self.authority.as_ref(),
            self.device.as_ref(),
            self.absolute_path,
            &self.segments,
            self.query.as_ref(),
        )
    }

    fn materialize(&mut self) -> Result<Arc<UriInner>, Infallible> {
        Ok(if self.hierarchical {
            UriInner::hierarchical(
                self.hash,
                self.scheme.clone(),
                self.authority.clone(),
                self.device.clone(),
                self.absolute_path,
                self.segments.clone(),
                self.query.clone(),
            )
        } else {
            // Both options are filled by `CanonicalUnit::opaque`.
            let scheme = self.scheme.clone().unwrap_or_default();
            let opaque_part = self.authority.clone().unwrap_or_default();
            UriInner::opaque(self.hash, scheme, opaque_part)
        })
    }
}

pub(crate) fn hierarchical(
    pool: &UriPool,
    scheme: Option<&str>,
    authority: Option<&str>,
    device: Option<&str>,
    absolute_path: bool,
    segments: &[&str],
    query: Option<&str>,
) -> Result<Uri, UriError> {
    if !valid_scheme(scheme) {
        return Err(UriError::InvalidScheme(scheme.unwrap_or_default().into()));
    }
    let scheme_arc = scheme.map(|s| pool.intern_lower(s));
    let scheme_ref = scheme_arc.as_deref();
    let archive = is_archive_scheme(scheme_ref);

    if archive {
        match authority {
            Some(value) if pool.valid_archive_authority(value) => {}
            value => {
                return Err(UriError::InvalidArchiveAuthority(value.unwrap_or_default().into()));
            }
        }
        if let Some(device) = device {
            return Err(UriError::InvalidDevice(device.into()));
        }
    } else if !valid_authority(authority) {
        return Err(UriError::InvalidAuthority(authority.unwrap_or_default().into()));
    }
    if !valid_device(device) {
        return Err(UriError::InvalidDevice(device.unwrap_or_default().into()));
    }
    for segment in segments {
        if !valid_segment(segment) {
            return Err(UriError::InvalidSegment((*segment).into()));
        }
    }
    if !valid_query(query) {
        return Err(UriError::InvalidQuery(query.unwrap_or_default().into()));
    }

    // An authority or device followed by a relative path has no
    // unambiguous rendering; such paths are absolute. So are archives.
    let absolute_path = absolute_path
        || archive
        || ((authority.is_some() || device.is_some()) && !segments.is_empty());

    let authority_arc = authority.map(|a| pool.intern_str(a));
    let device_arc = device.map(|d| pool.intern_str(d));
    let query_arc = query.map(|q| pool.intern_str(q));

    let mut segment_arcs = Vec::with_capacity(segments.len());
    let mut array_hash = 1u32;
    for segment in segments {
        let hash = hash_bytes(0, segment.as_bytes());
        segment_arcs.push(pool.intern_str_hashed(segment, hash));
        array_hash = array_hash.wrapping_mul(31).wrapping_add(hash);
    }
    let segment_array = pool.intern_segments(&segment_arcs, array_hash);

    let hash = compose_hash(
        true,
        scheme_ref,
        authority_arc.as_deref(),
        device_arc.as_deref(),
        absolute_path,
        &segment_array,
        query_arc.as_deref(),
    );
    let mut unit = CanonicalUnit::hierarchical(
        hash,
        scheme_arc,
        authority_arc,
        device_arc,
        absolute_path,
        segment_array,
        query_arc,
    );
    Ok(Uri(infallible(pool.uris.intern(&mut unit))))
}

pub(crate) fn opaque(pool: &UriPool, scheme: &str, opaque_part: &str) -> Result<Uri, UriError> {
    if scheme.is_empty() || !valid_scheme(Some(scheme)) {
        return Err(UriError::InvalidScheme(scheme.into()));
    }
    let scheme_arc = pool.intern_lower(scheme);
    if is_archive_scheme(Some(&scheme_arc)) {
        // Archive URIs are always hierarchical.
        return Err(UriError::InvalidScheme(scheme.into()));
    }
    if !valid_opaque_part(opaque_part) {
        return Err(UriError::InvalidOpaquePart(opaque_part.into()));
    }
    let opaque_arc = pool.intern_str(opaque_part);
    let hash = compose_hash(false, Some(&scheme_arc), Some(&opaque_arc), None, false, &[], None);
    let mut unit =
        CanonicalUnit::opaque(hash, scheme_arc, opaque_arc, pool.empty_segments.clone());
    Ok(Uri(infallible(pool.uris.intern(&mut unit))))
}

pub(crate) fn with_query(
    pool: &UriPool,
    uri: &Uri,
    query: Option<&str>,
) -> Result<Uri, UriError> {
    if !valid_query(query) {
        return Err(UriError::InvalidQuery(query.unwrap_or_default().into()));
    }
    let Repr::Hierarchical { scheme, authority, device, absolute_path, segments, query: old } =
        &uri.0.repr
    else {
        return Err(UriError::InvalidQuery(query.unwrap_or_default().into()));
    };
    // Already the requested query, and verifiably this pool's instance:
    // same canonical value, nothing to build. A URI from another pool
    // falls through so its components land in this pool.
    let same_query = match (query, old.as_deref()) {
        (None, None) => true,
        (Some(new), Some(old)) => new == old,
        _ => false,
    };
    if same_query && pool.uris.find(uri.0.hash, |v| std::ptr::eq(v, &*uri.0)).is_some() {
        return Ok(uri.clone());
    }

    let scheme_arc = scheme.as_deref().map(|s| pool.intern_str(s));
    let authority_arc = authority.as_deref().map(|a| pool.intern_str(a));
    let device_arc = device.as_deref().map(|d| pool.intern_str(d));
    let query_arc = query.map(|q| pool.intern_str(q));

    let mut segment_arcs = Vec::with_capacity(segments.len());
    let mut array_hash = 1u32;
    for segment in segments.iter() {
        let hash = hash_bytes(0, segment.as_bytes());
        segment_arcs.push(pool.intern_str_hashed(segment, hash));
        array_hash = array_hash.wrapping_mul(31).wrapping_add(hash);
    }
    let segment_array = pool.intern_segments(&segment_arcs, array_hash);

    let hash = compose_hash(
        true,
        scheme_arc.as_deref(),
        authority_arc.as_deref(),
        device_arc.as_deref(),
        *absolute_path,
        &segment_array,
        query_arc.as_deref(),
    );
    let mut unit = CanonicalUnit::hierarchical(
        hash,
        scheme_arc,
        authority_arc,
        device_arc,
        *absolute_path,
        segment_array,
        query_arc,
    );
    Ok(Uri(infallible(pool.uris.intern(&mut unit))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PathStyle;

    fn pool() -> UriPool { UriPool::with_path_style(PathStyle::Posix) }

    #[test]
    fn builds_hierarchical_from_components() {
        let pool = pool();
        let uri = pool
            .hierarchical(Some("http"), Some("example.org"), None, true, &["a", "b.txt"], None)
            .unwrap();
        assert_eq!(uri.as_str(), "http://example.org/a/b.txt");
        assert_eq!(uri.scheme(), Some("http"));
        assert_eq!(uri.authority(), Some("example.org"));
        assert!(uri.has_absolute_path());
    }

    #[test]
    fn component_uri_is_same_instance_as_parsed() {
        let pool = pool();
        let built = pool
            .hierarchical(Some("http"), Some("host"), None, true, &["p", "q"], Some("k=v"))
            .unwrap();
        let parsed = pool.parse("http://host/p/q?k=v").unwrap();
        assert_eq!(built, parsed);
    }

    #[test]
    fn scheme_is_lower_cased() {
        let pool = pool();
        let uri = pool.hierarchical(Some("HTTP"), Some("host"), None, true, &["p"], None).unwrap();
        assert_eq!(uri.scheme(), Some("http"));
        assert_eq!(uri, pool.parse("http://host/p").unwrap());
    }

    #[test]
    fn composed_hash_matches_rendered_string() {
        let pool = pool();
        for uri in [
            pool.hierarchical(Some("http"), Some("h:80"), None, true, &["p"], Some("q")).unwrap(),
            pool.hierarchical(Some("file"), None, Some("C:"), true, &["d", "f"], None).unwrap(),
            pool.relative(false, &["a", "b"], None).unwrap(),
            pool.opaque("mailto", "dev@example.org").unwrap(),
        ] {
            assert_eq!(uri.0.hash, hash_bytes(0, uri.as_str().as_bytes()), "{uri}");
        }
    }

    #[test]
    fn archive_authority_is_checked() {
        let pool = pool();
        let ok = pool
            .hierarchical(Some("jar"), Some("file:/tmp/a.zip!"), None, true, &["entry"], None)
            .unwrap();
        assert_eq!(ok.as_str(), "jar:file:/tmp/a.zip!/entry");
        assert!(ok.is_archive());

        let missing_bang =
            pool.hierarchical(Some("jar"), Some("file:/tmp/a.zip"), None, true, &["e"], None);
        assert!(matches!(missing_bang, Err(UriError::InvalidArchiveAuthority(_))));

        let no_authority = pool.hierarchical(Some("zip"), None, None, true, &["e"], None);
        assert!(matches!(no_authority, Err(UriError::InvalidArchiveAuthority(_))));

        let with_device = pool.hierarchical(
            Some("jar"),
            Some("file:/tmp/a.zip!"),
            Some("C:"),
            true,
            &["e"],
            None,
        );
        assert!(matches!(with_device, Err(UriError::InvalidDevice(_))));
    }

    #[test]
    fn authority_with_relative_path_is_made_absolute() {
        let pool = pool();
        let uri = pool.hierarchical(None, Some("auth"), None, false, &["a"], None).unwrap();
        assert!(uri.has_absolute_path());
        assert_eq!(uri.as_str(), "//auth/a");
        assert_eq!(uri, pool.parse("//auth/a").unwrap());

        // The relative rendering "//autha" means something else entirely.
        let parsed = pool.parse("//autha").unwrap();
        assert_eq!(parsed.authority(), Some("autha"));
        assert_eq!(parsed.segment_count(), 0);
        assert_ne!(uri, parsed);
    }

    #[test]
    fn every_component_shape_reparses_to_itself() {
        let pool = pool();
        let shapes = [
            pool.hierarchical(None, Some("h"), None, false, &["a", "b"], None).unwrap(),
            pool.hierarchical(Some("file"), None, Some("C:"), false, &["d"], None).unwrap(),
            pool.hierarchical(Some("http"), Some("h"), None, false, &[], Some("q")).unwrap(),
            pool.hierarchical(Some("file"), None, Some("C:"), false, &[], None).unwrap(),
            pool.hierarchical(Some("jar"), Some("file:/a.zip!"), None, false, &[], None).unwrap(),
            pool.relative(false, &["a"], None).unwrap(),
        ];
        for uri in shapes {
            assert_eq!(pool.parse(uri.as_str()).unwrap(), uri, "{uri}");
            assert_eq!(uri.0.hash, hash_bytes(0, uri.as_str().as_bytes()), "{uri}");
        }
    }

    #[test]
    fn rejects_malformed_components() {
        let pool = pool();
        assert!(matches!(
            pool.hierarchical(Some("ht tp"), None, None, true, &["p"], None),
            Err(UriError::InvalidScheme(_))
        ));
        assert!(matches!(
            pool.hierarchical(None, Some("host/oops"), None, true, &["p"], None),
            Err(UriError::InvalidAuthority(_))
        ));
        assert!(matches!(
            pool.hierarchical(None, None, Some("C"), true, &["p"], None),
            Err(UriError::InvalidDevice(_))
        ));
        assert!(matches!(
            pool.hierarchical(None, None, None, true, &["a/b"], None),
            Err(UriError::InvalidSegment(_))
        ));
        assert!(matches!(
            pool.hierarchical(None, None, None, true, &["p"], Some("q#f")),
            Err(UriError::InvalidQuery(_))
        ));
    }

    #[test]
    fn opaque_construction() {
        let pool = pool();
        let uri = pool.opaque("mailto", "a@b.c").unwrap();
        assert!(uri.is_opaque());
        assert_eq!(uri.as_str(), "mailto:a@b.c");
        assert_eq!(uri, pool.parse("mailto:a@b.c").unwrap());

        assert!(matches!(pool.opaque("", "x"), Err(UriError::InvalidScheme(_))));
        assert!(matches!(pool.opaque("jar", "x"), Err(UriError::InvalidScheme(_))));
        assert!(matches!(pool.opaque("mailto", ""), Err(UriError::InvalidOpaquePart(_))));
        assert!(matches!(pool.opaque("mailto", "/lead"), Err(UriError::InvalidOpaquePart(_))));
    }

    #[test]
    fn with_query_replaces_and_removes() {
        let pool = pool();
        let base = pool.parse("http://host/p").unwrap();

        let with = pool.with_query(&base, Some("k=v")).unwrap();
        assert_eq!(with.as_str(), "http://host/p?k=v");
        assert_eq!(with, pool.parse("http://host/p?k=v").unwrap());

        let same = pool.with_query(&with, Some("k=v")).unwrap();
        assert_eq!(same, with);

        let removed = pool.with_query(&with, None).unwrap();
        assert_eq!(removed, base);

        assert!(matches!(pool.with_query(&base, Some("a#b")), Err(UriError::InvalidQuery(_))));
        let opaque = pool.opaque("mailto", "a@b").unwrap();
        assert!(matches!(pool.with_query(&opaque, Some("x")), Err(UriError::InvalidQuery(_))));
    }

    #[test]
    fn with_query_from_another_pool_lands_in_the_called_pool() {
        let first = pool();
        let second = pool();
        let foreign = first.parse("http://host/p?x").unwrap();

        let local = second.with_query(&foreign, Some("y")).unwrap();
        assert_eq!(local, second.parse("http://host/p?y").unwrap());
        assert_eq!(local, second.with_query(&foreign, Some("y")).unwrap());

        // Same query, foreign instance: the result still belongs to the
        // called pool, not to the argument's.
        let same = second.with_query(&foreign, Some("x")).unwrap();
        assert_eq!(same, second.parse("http://host/p?x").unwrap());
        assert_ne!(same, foreign);
    }

    #[test]
    fn relative_uris() {
        let pool = pool();
        let rel = pool.relative(false, &["a", "b"], None).unwrap();
        assert!(rel.is_relative());
        assert_eq!(rel.as_str(), "a/b");
        assert_eq!(rel, pool.parse("a/b").unwrap());

        let abs = pool.relative(true, &["a"], Some("q")).unwrap();
        assert_eq!(abs.as_str(), "/a?q");
    }
}
