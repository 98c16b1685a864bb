/*!
Positions for the Glushkov construction.

A position identifies one occurrence of a matchable atom in the pattern
source, together with the markers the construction needs: an iteration
index for virtually unrolled bounded repetitions, accept/anchor/greedy
flags, a lookahead tick, and a lazy tag.

Everything is packed into one `u64` so positions are cheap values and a
[`Positions`] set is an ordered set of words:

```text
bits  0..=15   iteration index
bits 16..=47   source location (accepting-rule number when ACCEPT is set)
bit  52        TICKED  lookahead-stop marker
bit  53        GREEDY  inside a greedy quantifier body
bit  54        ANCHOR  zero-width anchor occurrence
bit  55        ACCEPT  synthetic accepting marker
bits 56..=63   lazy tag (truncated location of the deferring `?`)
```

The natural `u64` order is load-bearing: the lazy tag occupies the top
byte, so lazy positions sort last grouped by tag, which is exactly the
suffix [`trim_lazy`] scans; and the location dominates the iteration
index, so a bounded repetition can select the follow-map keys of its own
body by comparing against the body-entry sentinel.
*/

use std::collections::BTreeSet;
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::{Index, Location};

const ITER_BITS: u32 = 16;
const LOC_BITS: u32 = 32;
const LOC_SHIFT: u32 = ITER_BITS;
const TICKED: u64 = 1 << 52;
const GREEDY: u64 = 1 << 53;
const ANCHOR: u64 = 1 << 54;
const ACCEPT: u64 = 1 << 55;
const LAZY_SHIFT: u32 = 56;
const POS_MASK: u64 = (1 << (LOC_SHIFT + LOC_BITS)) - 1;

/// One atom occurrence, packed into a word. See the module docs for the
/// layout.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Position(u64);

impl Position {
    /// Sentinel distinct from every valid position.
    pub const NPOS: Position = Position(u64::MAX);

    pub fn new(loc: Location) -> Self {
        Position((loc as u64) << LOC_SHIFT)
    }

    /// Source location of the atom, or the rule number for accept markers.
    pub fn loc(self) -> Location {
        (self.0 >> LOC_SHIFT) as Location
    }

    /// Accepting-rule number carried by an accept marker.
    pub fn accepts(self) -> Index {
        self.loc() as Index
    }

    pub fn iter_index(self) -> Index {
        (self.0 & 0xFFFF) as Index
    }

    /// Returns the position with its iteration index advanced by `iter`.
    /// Nested repetitions compose: an inner clone keeps its offset when
    /// an outer repetition shifts the whole body.
    pub fn iter(self, iter: Index) -> Self {
        Position(self.0 + iter as u64)
    }

    pub fn is_accept(self) -> bool {
        self.0 & ACCEPT != 0
    }

    pub fn is_anchor(self) -> bool {
        self.0 & ANCHOR != 0
    }

    pub fn is_greedy(self) -> bool {
        self.0 & GREEDY != 0
    }

    pub fn is_ticked(self) -> bool {
        self.0 & TICKED != 0
    }

    /// Lazy tag, `0` when the position is not lazy.
    pub fn lazy(self) -> u8 {
        (self.0 >> LAZY_SHIFT) as u8
    }

    pub fn accept(self, yes: bool) -> Self {
        Position(if yes { self.0 | ACCEPT } else { self.0 & !ACCEPT })
    }

    pub fn anchor(self, yes: bool) -> Self {
        Position(if yes { self.0 | ANCHOR } else { self.0 & !ANCHOR })
    }

    pub fn greedy(self, yes: bool) -> Self {
        Position(if yes { self.0 | GREEDY } else { self.0 & !GREEDY })
    }

    pub fn ticked(self, yes: bool) -> Self {
        Position(if yes { self.0 | TICKED } else { self.0 & !TICKED })
    }

    /// Returns the position with its lazy tag replaced. Tags are the
    /// 8-bit truncation of the deferring quantifier's location; `0`
    /// clears laziness.
    pub fn lazy_at(self, loc: Location) -> Self {
        Position(self.0 & !(0xFF << LAZY_SHIFT) | ((loc as u8) as u64) << LAZY_SHIFT)
    }

    /// The bare location+iteration part, stripped of all markers. This
    /// is the follow-map key.
    pub fn pos(self) -> Self {
        Position(self.0 & POS_MASK)
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_accept() {
            write!(f, "({})", self.accepts())?;
        } else {
            if self.iter_index() != 0 {
                write!(f, "{}.", self.iter_index())?;
            }
            write!(f, "{}", self.loc())?;
        }
        if self.lazy() != 0 {
            write!(f, "?{}", self.lazy())?;
        }
        if self.is_anchor() {
            write!(f, "^")?;
        }
        if self.is_greedy() {
            write!(f, "!")?;
        }
        if self.is_ticked() {
            write!(f, "'")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// An ordered set of positions. Whole-set comparison is lexicographic,
/// which is what state deduplication keys on.
pub(crate) type Positions = BTreeSet<Position>;

/// Replaces every position in `pos` by its lazy-tagged copies, one per
/// deferring quantifier in `lazypos`. No-op when `lazypos` is empty.
pub(crate) fn lazy(lazypos: &Positions, pos: &mut Positions) {
    if !lazypos.is_empty() {
        *pos = lazy_copies(lazypos, pos);
    }
}

/// The fan-out of `pos` over every lazy tag in `lazypos`. An already
/// lazy position is re-tagged, the innermost quantifier wins last.
pub(crate) fn lazy_copies(lazypos: &Positions, pos: &Positions) -> Positions {
    let mut out = Positions::new();
    for p in pos {
        for q in lazypos {
            out.insert(p.lazy_at(q.loc()));
        }
    }
    out
}

/// Clears laziness and marks every position as sitting inside a greedy
/// quantifier body.
pub(crate) fn greedy(pos: &mut Positions) {
    *pos = pos.iter().map(|p| p.lazy_at(0).greedy(true)).collect();
}

/// Prunes the lazy suffix of a position set before it becomes a state.
///
/// Scanning from the end of the ordered set: a lazy accept or anchor is
/// really an accept/anchor, so it is made non-lazy and every remaining
/// position carrying the same tag is dropped (a lazy match stops there).
/// Other lazy positions survive with a non-lazy twin as long as they are
/// greedy; the scan stops at the first non-greedy lazy position.
pub(crate) fn trim_lazy(pos: &mut Positions) {
    let lazies: Vec<Position> =
        pos.iter().rev().take_while(|p| p.lazy() != 0).copied().collect();
    let mut add = Vec::new();
    let mut remove = Vec::new();
    let mut i = 0;
    while i < lazies.len() {
        let p = lazies[i];
        let tag = p.lazy();
        if p.is_accept() || p.is_anchor() {
            add.push(p.lazy_at(0));
            remove.push(p);
            i += 1;
            while i < lazies.len() && lazies[i].lazy() == tag {
                remove.push(lazies[i]);
                i += 1;
            }
        } else if !p.is_greedy() {
            break;
        } else {
            add.push(p.lazy_at(0));
            i += 1;
        }
    }
    for p in remove {
        pos.remove(&p);
    }
    for p in add {
        pos.insert(p);
    }
}
