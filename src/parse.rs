//! The full-string URI parser.
//!
//! Parsing is a single left-to-right scan that accumulates the polynomial
//! hash of every region as it goes, so components arrive at the string
//! pool with their hashes precomputed and the whole-string hash can be
//! reused for the URI itself whenever the input is already canonical.
//!
//! The fast path is one lock-free pool lookup under the whole-string
//! hash. Only a miss takes the URI pool's writer lock, and the entire
//! parse then runs under it; nested interning touches the string and
//! array pools only, which have their own locks.

use std::sync::Arc;

use tracing::trace;

use crate::{
    chars::{
        ARCHIVE_SEPARATOR, QUERY_SEPARATOR, SCHEME_SEPARATOR, SEGMENT_SEPARATOR, hash_byte,
        hash_bytes,
    },
    components::{CanonicalUnit, compose_hash},
    error::UriError,
    pool::{
        SCHEME_ARCHIVE_HASH, SCHEME_FILE_HASH, SCHEME_HTTP_HASH, SCHEME_JAR_HASH,
        SCHEME_PLATFORM_HASH, SCHEME_ZIP_HASH, UriPool, infallible,
    },
    uri::{Uri, is_archive_scheme},
};

/// Result of scanning for the next separator: the index it stopped at,
/// the hash of the region scanned over, and the terminating byte. The
/// terminator defaults to `?` when the scan ran off the end, so "at a
/// query or at the end" is a single comparison.
struct Scan {
    end: usize,
    hash: u32,
    term: u8,
}

/// Scan up to the next `/`, `:`, or `?`.
fn find_major_separator(bytes: &[u8], mut i: usize) -> Scan {
    let mut hash = 0u32;
    while i < bytes.len() {
        let b = bytes[i];
        if b == SEGMENT_SEPARATOR || b == SCHEME_SEPARATOR || b == QUERY_SEPARATOR {
            return Scan { end: i, hash, term: b };
        }
        hash = hash_byte(hash, b);
        i += 1;
    }
    Scan { end: i, hash, term: QUERY_SEPARATOR }
}

/// Scan up to the next `/` or `?`.
fn find_segment_end(bytes: &[u8], mut i: usize) -> Scan {
    let mut hash = 0u32;
    while i < bytes.len() {
        let b = bytes[i];
        if b == SEGMENT_SEPARATOR || b == QUERY_SEPARATOR {
            return Scan { end: i, hash, term: b };
        }
        hash = hash_byte(hash, b);
        i += 1;
    }
    Scan { end: i, hash, term: QUERY_SEPARATOR }
}

pub(crate) fn parse(pool: &UriPool, input: &str) -> Result<Uri, UriError> {
    let string_hash = hash_bytes(0, input.as_bytes());
    if let Some(existing) = pool.uris.find(string_hash, |v| v.matches_str(input)) {
        return Ok(Uri(existing));
    }
    trace!(input, "uri cache miss");
    let mut uris = pool.uris.lock();
    // Everything below runs under the URI pool's writer lock; the guard's
    // double-checked intern at the end settles races with other writers.

    let bytes = input.as_bytes();
    let len = bytes.len();

    // True until the scheme turns out to need lower-casing; while it holds,
    // the whole-string hash is the URI's hash and the input is its
    // canonical rendering.
    let mut has_expected_hash = true;
    let mut is_scheme_normal = true;
    let mut scheme: Option<Arc<str>> = None;
    let mut authority: Option<Arc<str>> = None;
    let mut device: Option<Arc<str>> = None;
    let mut absolute_path = false;
    let mut segments = pool.empty_segments.clone();
    let mut segments_hash = 1u32;
    let mut query: Option<Arc<str>> = None;
    let mut is_archive = false;
    let mut is_platform = false;

    let mut i = 0usize;
    let mut scan = find_major_separator(bytes, i);
    let mut j = scan.end;

    if scan.term == SCHEME_SEPARATOR {
        let region = &input[..j];
        // Hash-compare against the schemes we expect to see constantly,
        // then verify with one region comparison.
        let known = match scan.hash {
            SCHEME_PLATFORM_HASH => Some(&pool.well_known.platform),
            SCHEME_FILE_HASH => Some(&pool.well_known.file),
            SCHEME_HTTP_HASH => Some(&pool.well_known.http),
            SCHEME_JAR_HASH => Some(&pool.well_known.jar),
            SCHEME_ZIP_HASH => Some(&pool.well_known.zip),
            SCHEME_ARCHIVE_HASH => Some(&pool.well_known.archive),
            _ => None,
        };
        match known {
            Some(known) if &**known == region => {
                is_platform = scan.hash == SCHEME_PLATFORM_HASH;
                is_archive = matches!(
                    scan.hash,
                    SCHEME_JAR_HASH | SCHEME_ZIP_HASH | SCHEME_ARCHIVE_HASH
                );
                scheme = Some(known.clone());
            }
            _ => {
                let lower = pool.intern_lower(region);
                is_scheme_normal = !region.bytes().any(|b| b.is_ascii_uppercase());
                has_expected_hash = is_scheme_normal;
                is_archive = is_archive_scheme(Some(&lower));
                is_platform = &*lower == "platform";
                scheme = Some(lower);
            }
        }
        i = j + 1;
        scan = find_segment_end(bytes, i);
        j = scan.end;
    }

    if is_archive {
        // The authority of an archive URI is everything up to and
        // including the ! of the last archive separator, which must exist.
        let Some(pos) = input.rfind(ARCHIVE_SEPARATOR).filter(|&pos| pos >= i) else {
            return Err(UriError::MissingArchiveSeparator(input.into()));
        };
        absolute_path = true;
        authority = Some(pool.intern_str(&input[i..=pos]));
        i = pos + 2;
        scan = find_segment_end(bytes, i);
        j = scan.end;
    } else if i == j && scan.term == SEGMENT_SEPARATOR {
        // A leading /: definitely hierarchical.
        i += 1;
        scan = find_segment_end(bytes, i);
        j = scan.end;
        if j == i && scan.term == SEGMENT_SEPARATOR {
            // //: the next segment is the authority, even when empty.
            i += 1;
            scan = find_segment_end(bytes, i);
            j = scan.end;
            authority = Some(pool.intern_str_hashed(&input[i..j], scan.hash));
            i = j;
            if scan.term == SEGMENT_SEPARATOR {
                absolute_path = true;
                i += 1;
                scan = find_segment_end(bytes, i);
                j = scan.end;
            }
        } else {
            absolute_path = true;
        }
    } else if let Some(scheme) = scheme.take() {
        // A scheme not followed by a /: the rest is one opaque part.
        let opaque_part = pool.intern_str(&input[i..]);
        let hash =
            compose_hash(false, Some(&scheme), Some(&opaque_part), None, false, &[], None);
        let mut unit =
            CanonicalUnit::opaque(hash, scheme, opaque_part, pool.empty_segments.clone());
        return Ok(Uri(infallible(uris.intern(&mut unit))));
    }

    // The first path segment gets special treatment: it may be the device,
    // or the implicit empty segment of a path like "/" or "a//".
    let mut segments_remain = false;
    let start = i;
    let seg_len = j - i;
    i = j;
    if seg_len == 0 {
        if scan.term != QUERY_SEPARATOR {
            let empty = pool.intern_str_hashed("", 0);
            segments_hash = 31;
            segments = pool.append_segment(&segments, &empty, segments_hash);
            i += 1;
            scan = find_segment_end(bytes, i);
            j = scan.end;
            segments_remain = true;
        }
    } else if !is_archive && !is_platform && bytes[j - 1] == b':' {
        device = Some(pool.intern_str_hashed(&input[start..j], scan.hash));
        if scan.term == QUERY_SEPARATOR {
            // A device at the very end: no path at all.
            absolute_path = false;
        } else {
            i += 1;
            scan = find_segment_end(bytes, i);
            j = scan.end;
            // An empty segment right after the device is implicit in the
            // absolute path; only keep scanning if there is more.
            segments_remain = i != j || scan.term == SEGMENT_SEPARATOR;
        }
    } else {
        let segment = pool.intern_str_hashed(&input[start..j], scan.hash);
        segments_hash = segments_hash.wrapping_mul(31).wrapping_add(scan.hash);
        segments = pool.append_segment(&segments, &segment, segments_hash);
        if scan.term != QUERY_SEPARATOR {
            i += 1;
            scan = find_segment_end(bytes, i);
            j = scan.end;
            segments_remain = true;
        }
    }

    if segments_remain {
        loop {
            let segment = pool.intern_str_hashed(&input[i..j], scan.hash);
            segments_hash = segments_hash.wrapping_mul(31).wrapping_add(scan.hash);
            segments = pool.append_segment(&segments, &segment, segments_hash);
            i = j;
            if scan.term != SEGMENT_SEPARATOR {
                break;
            }
            i += 1;
            scan = find_segment_end(bytes, i);
            j = scan.end;
        }
    }

    // Anything left is the query.
    if i < len {
        i += 1;
        query = Some(pool.intern_str(&input[i..]));
    }

    let hash = if has_expected_hash {
        string_hash
    } else {
        compose_hash(
            true,
            scheme.as_deref(),
            authority.as_deref(),
            device.as_deref(),
            absolute_path,
            &segments,
            query.as_deref(),
        )
    };
    let mut unit = CanonicalUnit::hierarchical(
        hash,
        scheme,
        authority,
        device,
        absolute_path,
        segments,
        query,
    );
    let inner = infallible(uris.intern(&mut unit));
    if is_scheme_normal {
        // The input is this URI's canonical form; save the first render.
        let _ = inner.rendered.set(Box::from(input));
    }
    Ok(Uri(inner))
}
