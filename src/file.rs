//! Native file path canonicalization.
//!
//! A file path is encoded into a reusable scratch buffer in one pass:
//! native separators become `/`, bytes outside the segment character set
//! become percent-escapes, and segment boundaries and hashes are recorded
//! as they close. The buffer then serves both as the comparison key
//! against pooled URIs and as the source the segments are interned from,
//! so a hit never allocates.
//!
//! Absolute paths become `file:` URIs; on Windows a leading drive letter
//! segment turns into the device and a UNC prefix into the authority.
//! Relative paths become relative URIs.

use std::{convert::Infallible, sync::Arc};

use weak_pool::{AccessUnit, Scratch};

use crate::{
    chars::{
        ESCAPE, HEX_DIGITS, PLAIN_SEGMENT_CHAR, SEGMENT_SEPARATOR, hash_byte, hash_bytes,
    },
    pool::UriPool,
    uri::UriInner,
};

pub(crate) const FILE_BASE: &str = "file:/";
pub(crate) const FILE_BASE_HASH: u32 = hash_bytes(0, b"file:/");

/// One encoded segment: a byte range of the scratch buffer and its hash.
#[derive(Clone, Copy)]
pub(crate) struct SegSpan {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) hash: u32,
}

/// Reusable working state for the path parsers: the encoded byte buffer
/// and the spans of the segments found in it. Holds no pooled values, so
/// recycling it keeps nothing alive.
#[derive(Default)]
pub(crate) struct PathScratch {
    pub(crate) buf: Vec<u8>,
    pub(crate) segs: Vec<SegSpan>,
}

impl Scratch for PathScratch {
    fn reset(&mut self) {
        self.buf.clear();
        self.segs.clear();
    }
}

impl PathScratch {
    /// The encoded bytes as a string.
    pub(crate) fn encoded(&self) -> &str {
        // SAFETY: the buffer holds UTF-8 input bytes with ASCII-only
        // substitutions, and spans only ever split at ASCII separators.
        unsafe { std::str::from_utf8_unchecked(&self.buf) }
    }

    pub(crate) fn push_plain(&mut self, b: u8, hash: &mut u32, seg_hash: &mut u32) {
        self.buf.push(b);
        *hash = hash_byte(*hash, b);
        *seg_hash = hash_byte(*seg_hash, b);
    }

    pub(crate) fn push_escaped(&mut self, b: u8, hash: &mut u32, seg_hash: &mut u32) {
        for enc in [ESCAPE, HEX_DIGITS[(b >> 4) as usize], HEX_DIGITS[(b & 0x0F) as usize]] {
            self.buf.push(enc);
            *hash = hash_byte(*hash, enc);
            *seg_hash = hash_byte(*seg_hash, enc);
        }
    }

    /// Record the current segment's span, emit the `/` that closes it, and
    /// start the next one.
    pub(crate) fn close_segment(&mut self, start: &mut usize, hash: &mut u32, seg_hash: &mut u32) {
        self.segs.push(SegSpan { start: *start, end: self.buf.len(), hash: *seg_hash });
        self.buf.push(SEGMENT_SEPARATOR);
        *hash = hash_byte(*hash, SEGMENT_SEPARATOR);
        *start = self.buf.len();
        *seg_hash = 0;
    }
}

/// Access to the URI pool keyed by a native file path. After `prepare`,
/// the scratch buffer is the exact canonical rendering of the URI and
/// `segs` holds only the path segments; the authority and device, if
/// any, have been split off into their own spans.
pub(crate) struct FileUnit<'a> {
    pool: &'a UriPool,
    scratch: &'a mut PathScratch,
    hash: u32,
    absolute_file: bool,
    absolute_path: bool,
    authority: Option<SegSpan>,
    device: Option<SegSpan>,
}

impl<'a> FileUnit<'a> {
    pub(crate) fn prepare(pool: &'a UriPool, scratch: &'a mut PathScratch, path: &str) -> Self {
        let bytes = path.as_bytes();
        if bytes.is_empty() {
            // The empty path is the empty relative URI.
            return Self {
                pool,
                scratch,
                hash: 0,
                absolute_file: false,
                absolute_path: false,
                authority: None,
                device: None,
            };
        }

        let style = pool.path_style;
        let sep = style.separator();
        let absolute_file = style.is_absolute(path);
        let leading_separator = bytes[0] == SEGMENT_SEPARATOR || bytes[0] == sep;

        scratch.buf.reserve(3 * bytes.len() + FILE_BASE.len());
        let (mut hash, mut absolute_path) = if absolute_file {
            scratch.buf.extend_from_slice(FILE_BASE.as_bytes());
            (FILE_BASE_HASH, true)
        } else if leading_separator {
            scratch.buf.push(SEGMENT_SEPARATOR);
            (u32::from(SEGMENT_SEPARATOR), true)
        } else {
            (0, false)
        };
        let rest = if leading_separator { &bytes[1..] } else { bytes };

        let mut start = scratch.buf.len();
        let mut seg_hash = 0u32;
        for &b in rest {
            if b == SEGMENT_SEPARATOR || b == sep {
                scratch.close_segment(&mut start, &mut hash, &mut seg_hash);
            } else if b.is_ascii()
                && (!PLAIN_SEGMENT_CHAR.contains(b)
                    || b == b':' && !absolute_path && scratch.segs.is_empty())
            {
                // A colon in the first segment of a relative path would
                // read back as a scheme or device, so escape it too.
                scratch.push_escaped(b, &mut hash, &mut seg_hash);
            } else {
                scratch.push_plain(b, &mut hash, &mut seg_hash);
            }
        }
        scratch.segs.push(SegSpan { start, end: scratch.buf.len(), hash: seg_hash });

        // Split the authority and device out of the leading spans. The
        // empty segment their trailing separator leaves behind is implicit
        // in the absolute path and dropped.
        let mut authority = None;
        let mut device = None;
        let mut ignored_empty = false;
        let mut first = 0usize;
        if absolute_file {
            if scratch.segs[0].start == scratch.segs[0].end && scratch.segs.len() > 1 {
                // An empty first segment means a doubled separator led the
                // path: the next span is the authority.
                authority = Some(scratch.segs[1]);
                first = 2;
            }
            if first < scratch.segs.len() {
                let span = scratch.segs[first];
                if span.start == span.end {
                    if authority.is_some() {
                        ignored_empty = true;
                        first += 1;
                    }
                } else if scratch.buf[span.end - 1] == b':' {
                    device = Some(span);
                    first += 1;
                    if first < scratch.segs.len()
                        && scratch.segs[first].start == scratch.segs[first].end
                    {
                        ignored_empty = true;
                        first += 1;
                    }
                }
            }
            if ignored_empty && first < scratch.segs.len() {
                // The dropped segment sits mid-path, so its closing
                // separator is not part of the canonical rendering. Remove
                // the byte to keep the buffer usable as the lookup key.
                let pos = scratch.segs[first - 1].start;
                scratch.buf.remove(pos);
                for span in &mut scratch.segs[first..] {
                    span.start -= 1;
                    span.end -= 1;
                }
                hash = hash_bytes(0, &scratch.buf);
            }
            absolute_path = scratch.segs.len() > first || ignored_empty;
        }
        scratch.segs.drain(..first);

        Self { pool, scratch, hash, absolute_file, absolute_path, authority, device }
    }
}

impl AccessUnit<UriInner> for FileUnit<'_> {
    type Error = Infallible;

    #[inline]
    fn hash(&self) -> u32 { self.hash }

    fn matches(&self, value: &UriInner) -> bool { value.matches_str(self.scratch.encoded()) }

    fn materialize(&mut self) -> Result<Arc<UriInner>, Infallible> {
        let pool = self.pool;
        let buf = &self.scratch.buf;

        let mut kept: Vec<Arc<str>> = Vec::with_capacity(self.scratch.segs.len());
        let mut segments_hash = 1u32;
        for span in &self.scratch.segs {
            segments_hash = segments_hash.wrapping_mul(31).wrapping_add(span.hash);
            kept.push(pool.intern_buf(&buf[span.start..span.end], span.hash));
        }
        let segments = pool.intern_segments(&kept, segments_hash);

        Ok(if self.absolute_file {
            let authority =
                self.authority.map(|s| pool.intern_buf(&buf[s.start..s.end], s.hash));
            let device = self.device.map(|s| pool.intern_buf(&buf[s.start..s.end], s.hash));
            UriInner::hierarchical(
                self.hash,
                Some(pool.well_known.file.clone()),
                authority,
                device,
                self.absolute_path,
                segments,
                None,
            )
        } else {
            UriInner::hierarchical(self.hash, None, None, None, self.absolute_path, segments, None)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{PathStyle, UriPool};

    fn posix() -> UriPool { UriPool::with_path_style(PathStyle::Posix) }

    fn windows() -> UriPool { UriPool::with_path_style(PathStyle::Windows) }

    #[test]
    fn absolute_posix_path() {
        let pool = posix();
        let uri = pool.file_uri("/tmp/f.txt");
        assert_eq!(uri.as_str(), "file:/tmp/f.txt");
        assert!(uri.is_file());
        assert!(uri.has_absolute_path());
        assert_eq!(uri.segments().len(), 2);
        assert_eq!(uri, pool.parse("file:/tmp/f.txt").unwrap());
    }

    #[test]
    fn relative_posix_path() {
        let pool = posix();
        let uri = pool.file_uri("dir/f.txt");
        assert!(uri.is_relative());
        assert_eq!(uri.as_str(), "dir/f.txt");
        assert_eq!(uri, pool.parse("dir/f.txt").unwrap());
    }

    #[test]
    fn empty_path_is_empty_uri() {
        let pool = posix();
        let uri = pool.file_uri("");
        assert!(uri.is_empty());
        assert_eq!(uri, pool.parse("").unwrap());
    }

    #[test]
    fn escapes_reserved_bytes() {
        let pool = posix();
        assert_eq!(pool.file_uri("/a b/c").as_str(), "file:/a%20b/c");
        assert_eq!(pool.file_uri("/x%y").as_str(), "file:/x%25y");
        assert_eq!(pool.file_uri("/q?r#s").as_str(), "file:/q%3Fr%23s");
    }

    #[test]
    fn non_ascii_passes_through() {
        let pool = posix();
        let uri = pool.file_uri("/données/f");
        assert_eq!(uri.as_str(), "file:/données/f");
    }

    #[test]
    fn leading_colon_segment_of_relative_path_is_escaped() {
        let pool = posix();
        let uri = pool.file_uri("a:b/c");
        assert_eq!(uri.as_str(), "a%3Ab/c");
        assert!(uri.is_relative());
        // Later segments keep their colons.
        assert_eq!(pool.file_uri("x/a:b").as_str(), "x/a:b");
    }

    #[test]
    fn windows_drive_becomes_device() {
        let pool = windows();
        let uri = pool.file_uri("C:\\Users\\me\\f.txt");
        assert_eq!(uri.as_str(), "file:/C:/Users/me/f.txt");
        assert_eq!(uri.device(), Some("C:"));
        assert_eq!(uri.segments().len(), 3);
        assert_eq!(uri, pool.parse("file:/C:/Users/me/f.txt").unwrap());
    }

    #[test]
    fn windows_drive_root() {
        let pool = windows();
        let uri = pool.file_uri("C:\\");
        assert_eq!(uri.as_str(), "file:/C:/");
        assert_eq!(uri.device(), Some("C:"));
        assert!(uri.has_absolute_path());
        assert_eq!(uri.segment_count(), 0);
    }

    #[test]
    fn windows_unc_becomes_authority() {
        let pool = windows();
        let uri = pool.file_uri("\\\\server\\share\\f.txt");
        assert_eq!(uri.as_str(), "file://server/share/f.txt");
        assert_eq!(uri.authority(), Some("server"));
        assert_eq!(uri.device(), None);
        assert_eq!(uri.segments().len(), 2);
    }

    #[test]
    fn doubled_separator_after_authority_collapses() {
        let pool = posix();
        let a = pool.file_uri("//server//x");
        let b = pool.file_uri("//server//x");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "file://server/x");
        assert_eq!(a.authority(), Some("server"));
        assert_eq!(a.segments().len(), 1);
        assert_eq!(a, pool.parse("file://server/x").unwrap());
    }

    #[test]
    fn doubled_separator_after_device_collapses() {
        let pool = windows();
        let uri = pool.file_uri("C:\\\\Users");
        assert_eq!(uri.as_str(), "file:/C:/Users");
        assert_eq!(uri.device(), Some("C:"));
        assert_eq!(uri.segments().len(), 1);
        assert_eq!(uri, pool.file_uri("C:\\\\Users"));
        assert_eq!(uri, pool.parse("file:/C:/Users").unwrap());
    }

    #[test]
    fn windows_relative_path() {
        let pool = windows();
        let uri = pool.file_uri("dir\\f.txt");
        assert!(uri.is_relative());
        assert_eq!(uri.as_str(), "dir/f.txt");
    }

    #[test]
    fn leading_separator_without_drive_is_absolute_path_only() {
        // Not absolute by Windows rules, but still an absolute path.
        let pool = windows();
        let uri = pool.file_uri("\\foo\\bar");
        assert!(uri.is_relative());
        assert!(uri.has_absolute_path());
        assert_eq!(uri.as_str(), "/foo/bar");
    }

    #[test]
    fn file_uri_is_idempotent_and_shared_with_parse() {
        let pool = posix();
        let a = pool.file_uri("/tmp/shared.txt");
        let b = pool.file_uri("/tmp/shared.txt");
        assert_eq!(a, b);
        let parsed = pool.parse("file:/tmp/shared.txt").unwrap();
        assert_eq!(a, parsed);
    }
}
