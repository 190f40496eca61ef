//! Byte classification and polynomial hashing shared by the parsers.
//!
//! All pool hashes are the base-31 polynomial over a value's bytes with
//! wrapping `u32` arithmetic. `extend_hash` appends one hashed region to
//! another, so a URI's hash can be composed from component hashes and is
//! bit-identical to hashing its rendered string.

/// Separator between a scheme and the rest of a URI, and the trailing
/// marker of a device segment.
pub(crate) const SCHEME_SEPARATOR: u8 = b':';
pub(crate) const SEGMENT_SEPARATOR: u8 = b'/';
pub(crate) const QUERY_SEPARATOR: u8 = b'?';
pub(crate) const FRAGMENT_SEPARATOR: u8 = b'#';
pub(crate) const DEVICE_IDENTIFIER: u8 = b':';
pub(crate) const ESCAPE: u8 = b'%';

/// Separator between the authority and path of an archive URI.
pub(crate) const ARCHIVE_SEPARATOR: &str = "!/";

/// Uppercase digits used when percent-encoding.
pub(crate) const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// An ASCII character class as a pair of 64-bit masks.
#[derive(Clone, Copy)]
pub(crate) struct CharClass {
    lo: u64,
    hi: u64,
}

impl CharClass {
    pub(crate) const fn of(chars: &[u8]) -> Self {
        let mut lo = 0u64;
        let mut hi = 0u64;
        let mut i = 0;
        while i < chars.len() {
            let b = chars[i];
            if b < 64 {
                lo |= 1 << b;
            } else {
                hi |= 1 << (b - 64);
            }
            i += 1;
        }
        Self { lo, hi }
    }

    pub(crate) const fn range(from: u8, to: u8) -> Self {
        let mut lo = 0u64;
        let mut hi = 0u64;
        let mut b = from;
        while b <= to {
            if b < 64 {
                lo |= 1 << b;
            } else {
                hi |= 1 << (b - 64);
            }
            b += 1;
        }
        Self { lo, hi }
    }

    pub(crate) const fn union(self, other: Self) -> Self {
        Self { lo: self.lo | other.lo, hi: self.hi | other.hi }
    }

    #[inline]
    pub(crate) const fn contains(self, b: u8) -> bool {
        if b < 64 {
            self.lo >> b & 1 != 0
        } else if b < 128 {
            self.hi >> (b - 64) & 1 != 0
        } else {
            false
        }
    }
}

const ALPHA: CharClass = CharClass::range(b'a', b'z').union(CharClass::range(b'A', b'Z'));
const DIGIT: CharClass = CharClass::range(b'0', b'9');
const ALPHANUM: CharClass = ALPHA.union(DIGIT);
const UNRESERVED: CharClass = ALPHANUM.union(CharClass::of(b"-_.!~*'()"));

/// Characters permitted in a scheme.
pub(crate) const SCHEME_CHAR: CharClass = ALPHANUM.union(CharClass::of(b"+-."));

/// Characters the path encoders pass through untouched. Excludes `%`: a
/// literal percent in a native path becomes `%25` rather than reading
/// back as the start of an escape.
pub(crate) const PLAIN_SEGMENT_CHAR: CharClass = UNRESERVED.union(CharClass::of(b";:@&=+$,"));

/// Characters permitted in a path segment under validation: the plain
/// set plus `%`, which introduces an escape.
pub(crate) const SEGMENT_CHAR: CharClass = PLAIN_SEGMENT_CHAR.union(CharClass::of(b"%"));

/// Characters that corrupt URI structure and are escaped in platform
/// segments even when full encoding is off.
pub(crate) const PLATFORM_SEGMENT_RESERVED: CharClass = CharClass::of(b"/\\?#");

/// One step of the base-31 polynomial hash.
#[inline]
pub(crate) const fn hash_byte(h: u32, b: u8) -> u32 { h.wrapping_mul(31).wrapping_add(b as u32) }

/// Hash `bytes`, folding into `seed`.
pub(crate) const fn hash_bytes(seed: u32, bytes: &[u8]) -> u32 {
    let mut h = seed;
    let mut i = 0;
    while i < bytes.len() {
        h = hash_byte(h, bytes[i]);
        i += 1;
    }
    h
}

/// `31^n` under wrapping multiplication, by squaring.
pub(crate) const fn pow31(mut n: usize) -> u32 {
    let mut result: u32 = 1;
    let mut base: u32 = 31;
    while n > 0 {
        if n & 1 != 0 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        n >>= 1;
    }
    result
}

/// Append a region with hash `part_hash` and byte length `part_len` to a
/// hash `h`, as if the region's bytes had been folded in directly.
#[inline]
pub(crate) const fn extend_hash(h: u32, part_hash: u32, part_len: usize) -> u32 {
    h.wrapping_mul(pow31(part_len)).wrapping_add(part_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_direct_polynomial() {
        assert_eq!(hash_bytes(0, b""), 0);
        assert_eq!(hash_bytes(0, b"a"), 97);
        assert_eq!(hash_bytes(0, b"ab"), 31 * 97 + 98);
    }

    #[test]
    fn extend_hash_is_concatenation() {
        let whole = hash_bytes(0, b"platform:/resource/project");
        let head = hash_bytes(0, b"platform:/resource");
        let tail = hash_bytes(0, b"/project");
        assert_eq!(extend_hash(head, tail, b"/project".len()), whole);
    }

    #[test]
    fn pow31_matches_repeated_multiplication() {
        let mut expected: u32 = 1;
        for n in 0..40 {
            assert_eq!(pow31(n), expected);
            expected = expected.wrapping_mul(31);
        }
    }

    #[test]
    fn segment_char_membership() {
        for b in b"abcXYZ019-_.!~*'()%;:@&=+$," {
            assert!(SEGMENT_CHAR.contains(*b), "{}", *b as char);
        }
        for b in b"/?# \"<>\\^`{|}" {
            assert!(!SEGMENT_CHAR.contains(*b), "{}", *b as char);
        }
        assert!(!SEGMENT_CHAR.contains(0xC3));
    }

    #[test]
    fn plain_segment_char_excludes_escape() {
        assert!(SEGMENT_CHAR.contains(b'%'));
        assert!(!PLAIN_SEGMENT_CHAR.contains(b'%'));
        for b in b"abcXYZ019-_.!~*'();:@&=+$," {
            assert!(PLAIN_SEGMENT_CHAR.contains(*b), "{}", *b as char);
        }
    }

    #[test]
    fn scheme_char_membership() {
        for b in b"httpjarzip+-.A9" {
            assert!(SCHEME_CHAR.contains(*b));
        }
        for b in b":/%~" {
            assert!(!SCHEME_CHAR.contains(*b));
        }
    }
}
