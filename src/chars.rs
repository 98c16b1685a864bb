/*!
Character sets over the 8-bit alphabet plus meta symbols.

A transition in the automaton is keyed by a set over `0..=0xFF` extended
with a small number of meta symbols: anchors and boundaries that the
matcher recognizes as zero-width events rather than input bytes. Meta
codes sit above `0xFF` so they can never collide with data bytes.

The set is stored as a flat 320-bit bitmap (256 byte bits, then one bit
per meta symbol), which makes union, intersection, difference and
equality single-word operations and keeps the move-merging loop in the
DFA builder cheap.
*/

use bitvec::order::Lsb0;
use bitvec::slice::BitSlice;
use itertools::Itertools;

use crate::Char;

/// Lowest meta code; no symbol is assigned to the base value itself.
pub(crate) const META_MIN: Char = 0x100;
/// Non-word boundary at match begin.
pub(crate) const META_NWB: Char = 0x101;
/// Non-word boundary at match end.
pub(crate) const META_NWE: Char = 0x102;
/// Begin-of-word boundary at match begin.
pub(crate) const META_BWB: Char = 0x103;
/// End-of-word boundary at match begin.
pub(crate) const META_EWB: Char = 0x104;
/// Begin-of-word boundary at match end.
pub(crate) const META_BWE: Char = 0x105;
/// End-of-word boundary at match end.
pub(crate) const META_EWE: Char = 0x106;
/// Begin of line.
pub(crate) const META_BOL: Char = 0x107;
/// End of line.
pub(crate) const META_EOL: Char = 0x108;
/// Begin of buffer.
pub(crate) const META_BOB: Char = 0x109;
/// End of buffer.
pub(crate) const META_EOB: Char = 0x10A;
/// Indent boundary.
pub(crate) const META_IND: Char = 0x10B;
/// Dedent boundary.
pub(crate) const META_DED: Char = 0x10C;

pub(crate) fn is_meta(c: Char) -> bool {
    c >= META_MIN
}

/// Symbolic label of a meta code, used by the exporters.
pub(crate) fn meta_label(c: Char) -> &'static str {
    const LABELS: [&str; 12] = [
        "NWB", "NWE", "BWB", "EWB", "BWE", "EWE", "BOL", "EOL", "BOB", "EOB",
        "IND", "DED",
    ];
    LABELS[(c - META_NWB) as usize]
}

/// Names of the supported POSIX character classes. The parser matches
/// `\p{Name}` against these exactly and `[[:name:]]` against everything
/// past the first letter, so both capitalizations are accepted in
/// bracket lists.
pub(crate) const POSIX_CLASSES: [&str; 14] = [
    "ASCII", "Space", "Xdigit", "Cntrl", "Print", "Alnum", "Alpha", "Blank",
    "Digit", "Graph", "Lower", "Punct", "Upper", "Word",
];

const WORDS: usize = 5;

/// A set over bytes `0..=0xFF` and meta symbols, backed by a 320-bit
/// bitmap.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Chars {
    bits: [u64; WORDS],
}

impl Chars {
    pub fn new() -> Self {
        Chars::default()
    }

    pub fn insert(&mut self, c: Char) {
        self.bits[c as usize / 64] |= 1u64 << (c % 64);
    }

    /// Inserts the inclusive range `lo..=hi`.
    pub fn insert_range(&mut self, lo: Char, hi: Char) {
        debug_assert!(lo <= hi);
        for c in lo..=hi {
            self.insert(c);
        }
    }

    pub fn contains(&self, c: Char) -> bool {
        self.bits[c as usize / 64] & 1u64 << (c % 64) != 0
    }

    pub fn any(&self) -> bool {
        self.bits.iter().any(|&w| w != 0)
    }

    pub fn intersects(&self, other: &Chars) -> bool {
        self.bits.iter().zip(other.bits).any(|(a, b)| a & b != 0)
    }

    /// Complements the byte part of the set; meta bits are untouched.
    pub fn flip_bytes(&mut self) {
        for w in &mut self.bits[..4] {
            *w = !*w;
        }
    }

    /// Maximal runs of adjacent members, in ascending order. Byte runs
    /// never join meta runs because the base meta code is unoccupied.
    pub fn ranges(&self) -> impl Iterator<Item = (Char, Char)> + '_ {
        BitSlice::<_, Lsb0>::from_slice(&self.bits)
            .iter_ones()
            .map(|i| (i as Char, i as Char))
            .coalesce(
                |a, b| if b.0 == a.1 + 1 { Ok((a.0, b.1)) } else { Err((a, b)) },
            )
    }
}

impl std::ops::BitOrAssign for Chars {
    fn bitor_assign(&mut self, rhs: Chars) {
        for (a, b) in self.bits.iter_mut().zip(rhs.bits) {
            *a |= b;
        }
    }
}

impl std::ops::BitAnd for Chars {
    type Output = Chars;

    fn bitand(mut self, rhs: Chars) -> Chars {
        for (a, b) in self.bits.iter_mut().zip(rhs.bits) {
            *a &= b;
        }
        self
    }
}

impl std::ops::SubAssign for Chars {
    fn sub_assign(&mut self, rhs: Chars) {
        for (a, b) in self.bits.iter_mut().zip(rhs.bits) {
            *a &= !b;
        }
    }
}

impl std::fmt::Debug for Chars {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ranges()).finish()
    }
}

/// Inserts the byte set of POSIX class `index` (an index into
/// [`POSIX_CLASSES`]) into `chars`.
pub(crate) fn posix(index: usize, chars: &mut Chars) {
    match index {
        0 => chars.insert_range(0x00, 0x7F),
        1 => {
            chars.insert_range(b'\t' as Char, b'\r' as Char);
            chars.insert(b' ' as Char);
            chars.insert(0x85);
        }
        2 => {
            chars.insert_range(b'0' as Char, b'9' as Char);
            chars.insert_range(b'A' as Char, b'F' as Char);
            chars.insert_range(b'a' as Char, b'f' as Char);
        }
        3 => {
            chars.insert_range(0x00, 0x1F);
            chars.insert(0x7F);
        }
        4 => chars.insert_range(b' ' as Char, b'~' as Char),
        5 => {
            chars.insert_range(b'0' as Char, b'9' as Char);
            chars.insert_range(b'A' as Char, b'Z' as Char);
            chars.insert_range(b'a' as Char, b'z' as Char);
        }
        6 => {
            chars.insert_range(b'A' as Char, b'Z' as Char);
            chars.insert_range(b'a' as Char, b'z' as Char);
        }
        7 => {
            chars.insert(b'\t' as Char);
            chars.insert(b' ' as Char);
        }
        8 => chars.insert_range(b'0' as Char, b'9' as Char),
        9 => chars.insert_range(b'!' as Char, b'~' as Char),
        10 => chars.insert_range(b'a' as Char, b'z' as Char),
        11 => {
            chars.insert_range(b'!' as Char, b'/' as Char);
            chars.insert_range(b':' as Char, b'@' as Char);
            chars.insert_range(b'[' as Char, b'`' as Char);
            chars.insert_range(b'{' as Char, b'~' as Char);
        }
        12 => chars.insert_range(b'A' as Char, b'Z' as Char),
        13 => {
            chars.insert_range(b'0' as Char, b'9' as Char);
            chars.insert_range(b'A' as Char, b'Z' as Char);
            chars.insert_range(b'a' as Char, b'z' as Char);
            chars.insert(b'_' as Char);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_and_ranges() {
        let mut c = Chars::new();
        c.insert_range(b'a' as Char, b'c' as Char);
        c.insert(b'e' as Char);
        c.insert(META_BOL);
        assert_eq!(
            c.ranges().collect::<Vec<_>>(),
            vec![(0x61, 0x63), (0x65, 0x65), (META_BOL, META_BOL)]
        );
        assert!(c.contains(b'b' as Char));
        assert!(!c.contains(b'd' as Char));
        assert!(c.contains(META_BOL));
    }

    #[test]
    fn meta_runs_stay_separate_from_bytes() {
        let mut c = Chars::new();
        c.insert(0xFF);
        c.insert(META_NWB);
        // 0x100 is unoccupied, so the byte run cannot join the meta run.
        assert_eq!(c.ranges().collect::<Vec<_>>(), vec![(0xFF, 0xFF), (META_NWB, META_NWB)]);
    }

    #[test]
    fn word_boundary_metas_are_adjacent() {
        let mut c = Chars::new();
        c.insert_range(META_BWB, META_EWB);
        assert_eq!(c.ranges().collect::<Vec<_>>(), vec![(META_BWB, META_EWB)]);
    }

    #[test]
    fn flip_bytes_complements_byte_part_only() {
        let mut c = Chars::new();
        c.insert_range(0x00, 0xFE);
        c.insert(META_EOB);
        c.flip_bytes();
        assert_eq!(c.ranges().collect::<Vec<_>>(), vec![(0xFF, 0xFF), (META_EOB, META_EOB)]);
    }

    #[test]
    fn set_algebra() {
        let mut a = Chars::new();
        a.insert_range(0x10, 0x20);
        let mut b = Chars::new();
        b.insert_range(0x18, 0x28);
        assert!(a.intersects(&b));
        let common = a & b;
        assert_eq!(common.ranges().collect::<Vec<_>>(), vec![(0x18, 0x20)]);
        a -= common;
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0x10, 0x17)]);
        a |= b;
        assert_eq!(a.ranges().collect::<Vec<_>>(), vec![(0x10, 0x28)]);
        assert!(a.any());
    }

    #[test]
    fn posix_digit() {
        let mut c = Chars::new();
        posix(8, &mut c);
        assert_eq!(c.ranges().collect::<Vec<_>>(), vec![(0x30, 0x39)]);
    }

    #[test]
    fn meta_labels() {
        assert_eq!(meta_label(META_NWB), "NWB");
        assert_eq!(meta_label(META_DED), "DED");
        assert!(is_meta(META_MIN) && !is_meta(0xFF));
    }
}
