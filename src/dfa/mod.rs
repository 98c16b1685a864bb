/*!
DFA construction over position sets.

The builder runs the subset construction directly on the parser's
position functions: a state is an ordered set of positions, and the
moves out of a state are computed by grouping the follow sets of its
positions under disjoint character sets. States are deduplicated by
whole-set comparison, the one and only state-identity criterion, with
lazy trimming applied first so that laziness participates in identity.

States live in an arena indexed by [`StateId`]; the arena's order is the
discovery order, which later becomes the opcode layout order.
*/

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::chars::{is_meta, posix, Chars, META_BOB, META_BOL, META_BWB, META_BWE, META_DED, META_EOB, META_EOL, META_EWB, META_EWE, META_IND, META_NWB, META_NWE, POSIX_CLASSES};
use crate::errors::{report, Error, ErrorKind};
use crate::options::Options;
use crate::parser::{Follow, LookMap, ModMap};
use crate::position::{trim_lazy, Position, Positions};
use crate::source::{parse_esc, Cursor};
use crate::{Char, Index, Location};

pub(crate) mod encode;
pub(crate) mod instr;

#[cfg(test)]
mod tests;

pub(crate) type StateId = u32;

/// One DFA state. `edges` maps the low bound of a disjoint interval to
/// its high bound and target; `None` targets halt the matcher.
pub(crate) struct State {
    pub positions: Positions,
    /// Lowest accepting rule reached here, `0` when non-accepting.
    pub accept: Index,
    /// True when a rule-0 marker (negative pattern) lands here.
    pub redo: bool,
    /// Lookahead indices entered at this state.
    pub heads: BTreeSet<Index>,
    /// Lookahead indices exited at this state.
    pub tails: BTreeSet<Index>,
    pub edges: BTreeMap<Char, (Char, Option<StateId>)>,
    /// Opcode offset assigned by the encoder.
    pub index: Index,
}

impl State {
    fn new(positions: Positions) -> Self {
        State {
            positions,
            accept: 0,
            redo: false,
            heads: BTreeSet::new(),
            tails: BTreeSet::new(),
            edges: BTreeMap::new(),
            index: 0,
        }
    }
}

/// The finished automaton plus its statistics.
pub(crate) struct Dfa {
    pub states: Vec<State>,
    /// Per-rule acceptance reachability.
    pub acc: Vec<bool>,
    /// Transition count, one per covered byte or meta symbol.
    pub edge_count: usize,
}

type Move = (Chars, Positions);
type Moves = Vec<Move>;

pub(crate) struct Builder<'a> {
    cur: Cursor<'a>,
    opt: &'a Options,
    follow: Follow,
    modifiers: ModMap,
    lookahead: LookMap,
    rules: usize,
}

impl<'a> Builder<'a> {
    pub fn new(
        rex: &'a [u8],
        opt: &'a Options,
        follow: Follow,
        modifiers: ModMap,
        lookahead: LookMap,
        rules: usize,
    ) -> Self {
        Builder { cur: Cursor::new(rex), opt, follow, modifiers, lookahead, rules }
    }

    fn error(&self, kind: ErrorKind, message: &'static str, loc: Location) -> Result<(), Error> {
        report(self.opt, self.cur.rex(), kind, message, loc)
    }

    fn is_modified(&self, mode: u8, loc: Location) -> bool {
        self.modifiers.get(&mode).is_some_and(|r| r.contains(loc))
    }

    /// Runs the worklist: computes every state's moves, deduplicates the
    /// successors, and commits the edges.
    pub fn build(mut self, mut startpos: Positions) -> Result<Dfa, Error> {
        trim_lazy(&mut startpos);
        let mut states = vec![State::new(startpos.clone())];
        let mut dedup: BTreeMap<Positions, StateId> = BTreeMap::new();
        dedup.insert(startpos, 0);
        let mut acc = vec![false; self.rules];
        let mut edge_count = 0usize;
        let mut sid = 0usize;
        while sid < states.len() {
            let moves = self.compile_transition(&mut states[sid])?;
            for (chars, mut pos) in moves {
                trim_lazy(&mut pos);
                if pos.is_empty() {
                    continue;
                }
                let target = match dedup.get(&pos) {
                    Some(&id) => id,
                    None => {
                        let id = states.len() as StateId;
                        dedup.insert(pos.clone(), id);
                        states.push(State::new(pos));
                        id
                    }
                };
                for (lo, hi) in chars.ranges() {
                    states[sid].edges.insert(lo, (hi, Some(target)));
                    edge_count += (hi - lo + 1) as usize;
                }
            }
            let accept = states[sid].accept;
            if accept > 0 && (accept as usize) <= self.rules {
                acc[accept as usize - 1] = true;
            }
            sid += 1;
        }
        debug!("dfa: {} state(s), {} transition(s)", states.len(), edge_count);
        Ok(Dfa { states, acc, edge_count })
    }

    /// Computes the moves out of one state: for every non-accepting
    /// position, the character set its atom matches and the follow set
    /// it leads to. Lookahead markers become head/tail entries on the
    /// state instead of moves.
    fn compile_transition(&mut self, state: &mut State) -> Result<Moves, Error> {
        let mut moves: Moves = Vec::new();
        let positions: Vec<Position> = state.positions.iter().copied().collect();
        for k in positions {
            if k.is_accept() {
                let accept = k.accepts();
                if state.accept == 0 || accept < state.accept {
                    state.accept = accept;
                }
                if accept == 0 {
                    state.redo = true;
                }
                continue;
            }
            let loc = k.loc();
            let c = self.cur.at(loc);
            let literal = self.is_modified(b'q', loc);
            if c == b'/' && self.opt.l && !literal {
                self.mark_lookahead(state, loc, k.is_ticked());
                continue;
            }
            if c == b'(' && !literal {
                self.mark_lookahead(state, loc, false);
                continue;
            }
            if c == b')' && !literal {
                self.mark_lookahead(state, loc, true);
                continue;
            }
            if !self.follow.contains_key(&k.pos()) {
                continue;
            }
            let follow = if k.lazy() != 0 {
                // A lazy position that is also greedy was promoted by
                // trimming; its plain twin carries the move.
                if k.is_greedy() {
                    continue;
                }
                match self.follow.get(&k) {
                    Some(f) => f.clone(),
                    None => {
                        // Memoize the lazy follow set: targets inherit
                        // the tag except lookahead tails.
                        let lazified: Positions = self.follow[&k.pos()]
                            .iter()
                            .map(|p| {
                                if p.is_ticked() {
                                    *p
                                } else {
                                    p.lazy_at(k.lazy() as Location)
                                }
                            })
                            .collect();
                        self.follow.insert(k, lazified.clone());
                        lazified
                    }
                }
            } else {
                self.follow[&k.pos()].clone()
            };
            let mut chars = Chars::new();
            if literal {
                chars.insert(c as Char);
            } else {
                match c {
                    b'.' => {
                        if self.opt.s || self.is_modified(b's', loc) {
                            chars.insert_range(0x00, 0xFF);
                        } else {
                            chars.insert_range(0x00, 0x09);
                            chars.insert_range(0x0B, 0xFF);
                        }
                    }
                    b'^' => {
                        chars.insert(if self.opt.m || self.is_modified(b'm', loc) {
                            META_BOL
                        } else {
                            META_BOB
                        });
                    }
                    b'$' => {
                        chars.insert(if self.opt.m || self.is_modified(b'm', loc) {
                            META_EOL
                        } else {
                            META_EOB
                        });
                    }
                    _ => {
                        if c == b'['
                            && self.cur.escapes_at(loc, b"AZBb<>ij", self.opt.e) == 0
                        {
                            self.compile_list(loc + 1, &mut chars)?;
                        } else {
                            match self.cur.escape_at(loc, self.opt.e) {
                                b'i' => chars.insert(META_IND),
                                b'j' => chars.insert(META_DED),
                                b'A' => chars.insert(META_BOB),
                                b'Z' => chars.insert(META_EOB),
                                b'B' => chars.insert(if k.is_anchor() {
                                    META_NWB
                                } else {
                                    META_NWE
                                }),
                                b'b' => {
                                    if k.is_anchor() {
                                        chars.insert_range(META_BWB, META_EWB);
                                    } else {
                                        chars.insert_range(META_BWE, META_EWE);
                                    }
                                }
                                b'<' => chars.insert(if k.is_anchor() {
                                    META_BWB
                                } else {
                                    META_BWE
                                }),
                                b'>' => chars.insert(if k.is_anchor() {
                                    META_EWB
                                } else {
                                    META_EWE
                                }),
                                0 => {
                                    if c.is_ascii_alphabetic()
                                        && (self.opt.i || self.is_modified(b'i', loc))
                                    {
                                        chars.insert(c.to_ascii_uppercase() as Char);
                                        chars.insert(c.to_ascii_lowercase() as Char);
                                    } else {
                                        chars.insert(c as Char);
                                    }
                                }
                                _ => {
                                    self.compile_esc(loc + 1, &mut chars)?;
                                }
                            }
                        }
                    }
                }
            }
            transition(&mut moves, chars, follow);
        }
        Ok(moves)
    }

    /// Installs the global lookahead index for the span containing `loc`
    /// into the state's heads, or its tails when `tail` is set.
    /// Lookaheads are numbered by enumerating every rule's spans in rule
    /// order.
    fn mark_lookahead(&self, state: &mut State, loc: Location, tail: bool) {
        let mut n: Index = 0;
        for ranges in self.lookahead.values() {
            if let Some(j) = ranges.find(loc) {
                let index = n + j as Index;
                if tail {
                    state.tails.insert(index);
                } else {
                    state.heads.insert(index);
                }
            }
            n += ranges.len() as Index;
        }
    }

    /// Expands a bracket list starting after its `[` into a byte set,
    /// honoring ranges, POSIX classes, escapes and scoped modifiers.
    fn compile_list(&self, mut loc: Location, chars: &mut Chars) -> Result<(), Error> {
        let complement = self.cur.at(loc) == b'^';
        if complement {
            loc += 1;
        }
        // META_BOL marks "start of list", META_EOL marks "no pending
        // value"; both are outside the byte alphabet.
        let mut prev: Char = META_BOL;
        let mut lo: Char = META_EOL;
        let mut c = self.cur.at(loc) as Char;
        while c != 0 && (c != b']' as Char || prev == META_BOL) {
            if c == b'-' as Char && !is_meta(prev) && is_meta(lo) {
                lo = prev;
            } else {
                let mut posix_form = false;
                if c == b'[' as Char && self.cur.at(loc + 1) == b':' {
                    if let Some(c_loc) = self.cur.find_at(loc + 2, b':') {
                        if self.cur.at(c_loc + 1) == b']' {
                            posix_form = true;
                            if c_loc == loc + 3 {
                                // [:x:] is the single-letter escape form.
                                c = self.compile_esc(loc + 2, chars)?;
                            } else {
                                // The first letter of the class name is
                                // matched case-insensitively.
                                match POSIX_CLASSES
                                    .iter()
                                    .position(|name| self.cur.eq_at(loc + 3, &name[1..]))
                                {
                                    Some(i) => posix(i, chars),
                                    None => self.error(
                                        ErrorKind::RegexSyntax,
                                        "unrecognized POSIX character class",
                                        loc,
                                    )?,
                                }
                                c = META_EOL;
                            }
                            loc = c_loc + 1;
                        }
                    }
                }
                if !posix_form
                    && self.cur.at(loc) == self.opt.e
                    && self.opt.e != 0
                    && !self.opt.b
                {
                    c = self.compile_esc(loc + 1, chars)?;
                    let mut esc_end = loc;
                    parse_esc(&self.cur, self.opt, &mut esc_end)?;
                    loc = esc_end - 1;
                }
                if !is_meta(c) {
                    if !is_meta(lo) {
                        if lo <= c {
                            chars.insert_range(lo, c);
                            if self.opt.i || self.is_modified(b'i', loc) {
                                for a in lo..=c {
                                    let a = a as u8;
                                    if a.is_ascii_uppercase() {
                                        chars.insert(a.to_ascii_lowercase() as Char);
                                    } else if a.is_ascii_lowercase() {
                                        chars.insert(a.to_ascii_uppercase() as Char);
                                    }
                                }
                            }
                        } else {
                            self.error(
                                ErrorKind::RegexList,
                                "inverted character range in list",
                                loc,
                            )?;
                        }
                        c = META_EOL;
                    } else if (c as u8).is_ascii_alphabetic()
                        && (self.opt.i || self.is_modified(b'i', loc))
                    {
                        chars.insert((c as u8).to_ascii_uppercase() as Char);
                        chars.insert((c as u8).to_ascii_lowercase() as Char);
                    } else {
                        chars.insert(c);
                    }
                }
                prev = c;
                lo = META_EOL;
            }
            loc += 1;
            c = self.cur.at(loc) as Char;
        }
        // A trailing `-` is a literal.
        if !is_meta(lo) {
            chars.insert(b'-' as Char);
        }
        if complement {
            chars.flip_bytes();
        }
        Ok(())
    }

    /// Expands the escape whose letter sits at `loc` into `chars`.
    /// Returns the matched byte, or a value outside the byte alphabet
    /// for class escapes and out-of-range code points.
    fn compile_esc(&self, loc: Location, chars: &mut Chars) -> Result<Char, Error> {
        let c = self.cur.at(loc);
        let mut ch = c as Char;
        if c == b'0' {
            ch = self.scan_radix(loc + 1, 3, 8);
        } else if (c == b'x' || c == b'u') && self.cur.at(loc + 1) == b'{' {
            ch = self.scan_radix(loc + 2, 8, 16);
        } else if c == b'x' && self.cur.at(loc + 1).is_ascii_hexdigit() {
            ch = self.scan_radix(loc + 1, 2, 16);
        } else if c == b'c' {
            ch = (self.cur.at(loc + 1) % 32) as Char;
        } else if c == b'e' {
            ch = 0x1B;
        } else if c == b'_' {
            // Alphabetical class; the underscore itself matches too.
            posix(6, chars);
        } else if c == b'p' && self.cur.at(loc + 1) == b'{' {
            match POSIX_CLASSES.iter().position(|name| self.cur.eq_at(loc + 2, name)) {
                Some(i) => posix(i, chars),
                None => self.error(
                    ErrorKind::RegexSyntax,
                    "unrecognized character class",
                    loc,
                )?,
            }
            return Ok(META_EOL);
        } else if let Some(i) = b"abtnvfr".iter().position(|&x| x == c) {
            ch = 0x07 + i as Char;
        } else if let Some(i) =
            b"__sSxX________hHdD__lL__uUwW".iter().position(|&x| x == c)
        {
            posix(i / 2, chars);
            if i % 2 != 0 {
                chars.flip_bytes();
            }
            return Ok(META_EOL);
        }
        if ch <= 0xFF {
            chars.insert(ch);
        }
        Ok(ch)
    }

    /// Scans up to `max` digits in the given radix; values above the
    /// byte alphabet collapse to a non-byte marker.
    fn scan_radix(&self, loc: Location, max: u32, radix: u32) -> Char {
        let mut value: u32 = 0;
        for i in 0..max {
            let d = self.cur.at(loc + i);
            match (d as char).to_digit(radix) {
                Some(d) => value = value.saturating_mul(radix).saturating_add(d),
                None => break,
            }
        }
        if value <= 0xFF {
            value as Char
        } else {
            META_EOL
        }
    }
}

/// Adds a `(chars, follow)` pair to the move list, keeping the charsets
/// pairwise disjoint and the follow set of each move unique.
fn transition(moves: &mut Moves, chars: Chars, follow: Positions) {
    let mut rest = chars;
    let mut i = 0;
    while i < moves.len() {
        if moves[i].1 == follow {
            // Same follow set: coalesce the character sets.
            rest |= moves[i].0;
            moves.remove(i);
            continue;
        }
        if chars.intersects(&moves[i].0) {
            let common = chars & moves[i].0;
            if follow.is_subset(&moves[i].1) {
                rest -= common;
                i += 1;
            } else if moves[i].0 == common && moves[i].1.is_subset(&follow) {
                moves.remove(i);
                continue;
            } else {
                // Split the overlap out as its own move with the union
                // of both follow sets.
                rest -= common;
                moves[i].0 -= common;
                if moves[i].0.any() {
                    let mut joined = moves[i].1.clone();
                    joined.extend(follow.iter().copied());
                    moves.push((common, joined));
                } else {
                    moves[i].0 = common;
                    moves[i].1.extend(follow.iter().copied());
                }
                i += 1;
            }
        } else {
            i += 1;
        }
    }
    if rest.any() {
        moves.push((rest, follow));
    }
}

/// Fuses adjacent byte edges that share a target. Meta edges and edges
/// already reaching `0xFF` are left alone.
pub(crate) fn compact_dfa(dfa: &mut Dfa) {
    for state in &mut dfa.states {
        let mut out: Vec<(Char, (Char, Option<StateId>))> = Vec::new();
        for (lo, (hi, target)) in std::mem::take(&mut state.edges) {
            match out.last_mut() {
                Some((_, (prev_hi, prev_target)))
                    if !is_meta(lo)
                        && *prev_hi < 0xFF
                        && lo <= *prev_hi + 1
                        && *prev_target == target =>
                {
                    *prev_hi = hi;
                }
                _ => out.push((lo, (hi, target))),
            }
        }
        state.edges = out.into_iter().collect();
    }
}
