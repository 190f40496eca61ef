//! Workspace and plugin path canonicalization.
//!
//! A platform URI is `platform:/resource/...` or `platform:/plugin/...`
//! with the caller's path appended. Encoding reuses the same scratch
//! machinery as file paths, with one twist: when the caller asks for no
//! encoding, only the characters that would corrupt the URI's structure
//! (`/`, `\`, `?`, `#`) are escaped and everything else is trusted as
//! already encoded.

use std::{convert::Infallible, sync::Arc};

use weak_pool::AccessUnit;

use crate::{
    chars::{
        PLAIN_SEGMENT_CHAR, PLATFORM_SEGMENT_RESERVED, SEGMENT_SEPARATOR, extend_hash, hash_bytes,
    },
    file::{PathScratch, SegSpan},
    pool::{SEGMENT_PLUGIN_HASH, SEGMENT_RESOURCE_HASH, UriPool},
    uri::UriInner,
};

const RESOURCE_INITIAL_HASH: u32 = hash_bytes(0, b"platform:/resource");
const RESOURCE_FULL_HASH: u32 = hash_bytes(0, b"platform:/resource/");
const PLUGIN_INITIAL_HASH: u32 = hash_bytes(0, b"platform:/plugin");
const PLUGIN_FULL_HASH: u32 = hash_bytes(0, b"platform:/plugin/");

/// Access to the URI pool keyed by a platform path under one base
/// segment (`resource` or `plugin`).
pub(crate) struct PlatformUnit<'a> {
    pool: &'a UriPool,
    scratch: &'a mut PathScratch,
    base: Arc<str>,
    base_hash: u32,
    hash: u32,
}

impl<'a> PlatformUnit<'a> {
    pub(crate) fn prepare(
        pool: &'a UriPool,
        scratch: &'a mut PathScratch,
        resource: bool,
        path: &str,
        encode: bool,
    ) -> Self {
        let (base, base_hash, initial_hash, full_hash) = if resource {
            (
                pool.well_known.resource.clone(),
                SEGMENT_RESOURCE_HASH,
                RESOURCE_INITIAL_HASH,
                RESOURCE_FULL_HASH,
            )
        } else {
            (
                pool.well_known.plugin.clone(),
                SEGMENT_PLUGIN_HASH,
                PLUGIN_INITIAL_HASH,
                PLUGIN_FULL_HASH,
            )
        };

        let bytes = path.as_bytes();
        if bytes.is_empty() {
            // The empty path still gets its trailing slash: one empty
            // segment after the base.
            scratch.buf.push(SEGMENT_SEPARATOR);
            scratch.segs.push(SegSpan { start: 1, end: 1, hash: 0 });
            return Self { pool, scratch, base, base_hash, hash: full_hash };
        }

        let sep = pool.path_style.separator();
        scratch.buf.reserve(3 * bytes.len() + 1);
        scratch.buf.push(SEGMENT_SEPARATOR);
        let mut path_hash = u32::from(SEGMENT_SEPARATOR);
        let rest =
            if bytes[0] == SEGMENT_SEPARATOR || bytes[0] == sep { &bytes[1..] } else { bytes };

        let mut start = scratch.buf.len();
        let mut seg_hash = 0u32;
        for &b in rest {
            let reserved = if encode {
                b.is_ascii() && !PLAIN_SEGMENT_CHAR.contains(b)
            } else {
                PLATFORM_SEGMENT_RESERVED.contains(b)
            };
            if reserved {
                if b == SEGMENT_SEPARATOR || b == sep {
                    scratch.close_segment(&mut start, &mut path_hash, &mut seg_hash);
                } else {
                    scratch.push_escaped(b, &mut path_hash, &mut seg_hash);
                }
            } else {
                scratch.push_plain(b, &mut path_hash, &mut seg_hash);
            }
        }
        scratch.segs.push(SegSpan { start, end: scratch.buf.len(), hash: seg_hash });

        let hash = extend_hash(initial_hash, path_hash, scratch.buf.len());
        Self { pool, scratch, base, base_hash, hash }
    }
}

impl AccessUnit<UriInner> for PlatformUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    fn matches(&self, value: &UriInner) -> bool {
        value.matches_platform(&self.base, self.scratch.encoded())
    }

    fn materialize(&mut self) -> Result<Arc<UriInner>, Infallible> {
        let pool = self.pool;
        let buf = &self.scratch.buf;

        let mut segments = Vec::with_capacity(self.scratch.segs.len() + 1);
        segments.push(self.base.clone());
        let mut segments_hash = 31u32.wrapping_add(self.base_hash);
        for span in &self.scratch.segs {
            segments_hash = segments_hash.wrapping_mul(31).wrapping_add(span.hash);
            segments.push(pool.intern_buf(&buf[span.start..span.end], span.hash));
        }
        let segments = pool.intern_segments(&segments, segments_hash);

        Ok(UriInner::hierarchical(
            self.hash,
            Some(pool.well_known.platform.clone()),
            None,
            None,
            true,
            segments,
            None,
        ))
    }
}
