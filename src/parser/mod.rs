/*!
Recursive-descent parser computing the Glushkov position functions.

Instead of building a syntax tree, the parser computes `firstpos`,
`lastpos`, `nullable` and `followpos` directly while it walks the
pattern, one grammar level per function:

- [`Parser::parse`]: top-level `|`-separated alternatives, one accepting
  rule each;
- [`Parser::parse1`]: alternation inside a subexpression;
- [`Parser::parse2`]: concatenation, buffered begin anchors, the `/`
  lookahead operator;
- [`Parser::parse3`]: quantifiers, including lazy variants and `{n,m}`
  bounded repetition by virtual unrolling;
- [`Parser::parse4`]: atoms — groups, bracket lists, quoted literals,
  comments, single (possibly escaped) characters.

Atoms are absorbed as a single position pointing at their source
location; their expansion into byte sets is deferred to the DFA builder,
which re-reads the source at that location. Alongside the position
functions the parser records the scope ranges of inline modifiers and
the head/tail spans of lookaheads.
*/

use std::collections::BTreeMap;

use log::debug;
use rustc_hash::FxHashMap;

use crate::errors::{report, Error, ErrorKind};
use crate::options::Options;
use crate::position::{greedy, lazy, lazy_copies, Position, Positions};
use crate::ranges::Ranges;
use crate::source::{parse_esc, Cursor};
use crate::{Index, Location, IMAX};


/// `followpos` for the construction: maps a bare position (location +
/// iteration) to its successor set. Iteration order is never observable.
pub(crate) type Follow = FxHashMap<Position, Positions>;

/// Modifier letter to the source ranges where it is active.
pub(crate) type ModMap = BTreeMap<u8, Ranges>;

/// Accepting rule to the spans of its lookaheads, in source order.
pub(crate) type LookMap = BTreeMap<Index, Ranges>;

/// Everything the DFA builder needs from a parsed pattern.
#[derive(Debug)]
pub(crate) struct Parsed {
    pub startpos: Positions,
    pub followpos: Follow,
    pub modifiers: ModMap,
    pub lookahead: LookMap,
    /// End offset of each top-level alternative's source span.
    pub end: Vec<Location>,
    /// Options after parsing; an inline `(?flags)` group at the start of
    /// the pattern mutates them for good.
    pub opt: Options,
}

/// The position functions of one subexpression.
#[derive(Default)]
struct Expr {
    firstpos: Positions,
    lastpos: Positions,
    nullable: bool,
    /// Deferring quantifier positions that enclose this subexpression.
    lazypos: Positions,
    /// Virtual-iteration fan-out accumulated by bounded repetitions.
    iter: Index,
}

pub(crate) struct Parser<'a> {
    cur: Cursor<'a>,
    opt: Options,
    loc: Location,
    rule: Index,
    follow: Follow,
    modifiers: ModMap,
    lookahead: LookMap,
    end: Vec<Location>,
}

impl<'a> Parser<'a> {
    pub fn new(rex: &'a [u8], opt: Options) -> Self {
        Parser {
            cur: Cursor::new(rex),
            opt,
            loc: 0,
            rule: 1,
            follow: Follow::default(),
            modifiers: ModMap::new(),
            lookahead: LookMap::new(),
            end: Vec::new(),
        }
    }

    #[inline]
    fn at(&self, loc: Location) -> u8 {
        self.cur.at(loc)
    }

    #[inline]
    fn escape_at(&self, loc: Location) -> u8 {
        self.cur.escape_at(loc, self.opt.e)
    }

    #[inline]
    fn escapes_at(&self, loc: Location, set: &[u8]) -> u8 {
        self.cur.escapes_at(loc, set, self.opt.e)
    }

    fn error(&self, kind: ErrorKind, message: &'static str, loc: Location) -> Result<(), Error> {
        report(&self.opt, self.cur.rex(), kind, message, loc)
    }

    /// The lookahead span set of the rule being parsed.
    fn look(&mut self) -> &mut Ranges {
        self.lookahead.entry(self.rule).or_default()
    }

    fn follow_of(&mut self, p: Position) -> &mut Positions {
        self.follow.entry(p.pos()).or_default()
    }

    /// Parses the whole pattern: each top-level alternative becomes one
    /// accepting rule, its `lastpos` members wired to a synthetic accept
    /// marker through `followpos`.
    pub fn parse(mut self) -> Result<Parsed, Error> {
        let mut startpos = Positions::new();
        loop {
            let e = self.parse2(true)?;
            self.end.push(self.loc);
            startpos.extend(e.firstpos.iter().copied());
            let accept = Position::new(self.rule as Location).accept(true);
            if e.nullable {
                if e.lazypos.is_empty() {
                    startpos.insert(accept);
                } else {
                    for q in &e.lazypos {
                        startpos.insert(accept.lazy_at(q.loc()));
                    }
                }
            }
            for p in &e.lastpos {
                if e.lazypos.is_empty() {
                    self.follow.entry(p.pos()).or_default().insert(accept);
                } else {
                    for q in &e.lazypos {
                        self.follow
                            .entry(p.pos())
                            .or_default()
                            .insert(accept.lazy_at(q.loc()));
                    }
                }
            }
            self.rule += 1;
            let c = self.at(self.loc);
            self.loc += 1;
            if c != b'|' {
                break;
            }
        }
        debug!(
            "parsed {} rule(s), {} follow entries",
            self.end.len(),
            self.follow.len()
        );
        Ok(Parsed {
            startpos,
            followpos: self.follow,
            modifiers: self.modifiers,
            lookahead: self.lookahead,
            end: self.end,
            opt: self.opt,
        })
    }

    /// Alternation level: `e1|e2|…`.
    fn parse1(&mut self, begin: bool) -> Result<Expr, Error> {
        let mut e = self.parse2(begin)?;
        while self.at(self.loc) == b'|' {
            self.loc += 1;
            let e1 = self.parse2(begin)?;
            e.firstpos.extend(e1.firstpos.iter().copied());
            e.lastpos.extend(e1.lastpos.iter().copied());
            e.lazypos.extend(e1.lazypos.iter().copied());
            e.nullable |= e1.nullable;
            e.iter = e.iter.max(e1.iter);
        }
        Ok(e)
    }

    /// Concatenation level. Anchors at the head of the concatenation are
    /// buffered and spliced in once the rest is known; the `/` operator
    /// splits the concatenation into match and lookahead halves.
    fn parse2(&mut self, mut begin: bool) -> Result<Expr, Error> {
        let mut a_pos = Positions::new();
        if begin {
            loop {
                if self.opt.x {
                    while self.at(self.loc).is_ascii_whitespace() {
                        self.loc += 1;
                    }
                }
                if self.at(self.loc) == b'^' {
                    a_pos.insert(Position::new(self.loc));
                    self.loc += 1;
                } else if self.escapes_at(self.loc, b"ABb<>") != 0 {
                    a_pos.insert(Position::new(self.loc));
                    self.loc += 2;
                } else {
                    if self.escapes_at(self.loc, b"ij") != 0 {
                        begin = false;
                    }
                    break;
                }
            }
        }
        let mut e = self.parse3(begin)?;
        let mut l_pos = Position::NPOS;
        loop {
            let c = self.at(self.loc);
            if c == 0 || c == b'|' || c == b')' {
                break;
            }
            if c == b'/'
                && l_pos == Position::NPOS
                && self.opt.l
                && (!self.opt.x || self.at(self.loc + 1) != b'*')
            {
                l_pos = Position::new(self.loc);
                self.loc += 1;
            }
            let mut e1 = self.parse3(false)?;
            if c == b'/' && l_pos != Position::NPOS {
                e1.firstpos.insert(l_pos);
            }
            if !e.lazypos.is_empty() {
                let copies = lazy_copies(&e.lazypos, &e1.firstpos);
                e1.firstpos.extend(copies);
            }
            if e.nullable {
                e.firstpos.extend(e1.firstpos.iter().copied());
            }
            for p in &e.lastpos {
                self.follow
                    .entry(p.pos())
                    .or_default()
                    .extend(e1.firstpos.iter().copied());
            }
            if e1.nullable {
                e.lastpos.extend(e1.lastpos.iter().copied());
            } else {
                e.lastpos = e1.lastpos;
                e.nullable = false;
            }
            e.lazypos.extend(e1.lazypos.iter().copied());
            e.iter = e.iter.max(e1.iter);
        }
        for p in a_pos {
            // A lookahead tail in lastpos keeps the anchor as successor;
            // everything else gets the anchor spliced into followpos,
            // marked so self-loops and progress edges stay distinct.
            let tails: Vec<Position> = e
                .lastpos
                .iter()
                .filter(|k| {
                    let kc = self.at(k.loc());
                    (kc == b')' || (self.opt.l && kc == b'/'))
                        && self.lookahead.get(&self.rule).is_some_and(|r| r.contains(k.loc()))
                })
                .copied()
                .collect();
            for k in tails {
                self.follow_of(p).insert(k);
            }
            for k in e.lastpos.iter().copied().collect::<Vec<_>>() {
                let marked = p.anchor(!e.nullable || k.pos() != p.pos());
                self.follow_of(k).insert(marked);
            }
            e.lastpos.clear();
            e.lastpos.insert(p);
            if e.nullable {
                e.firstpos.insert(p);
                e.nullable = false;
            }
        }
        if l_pos != Position::NPOS {
            let tail = l_pos.ticked(true);
            for k in e.lastpos.iter().copied().collect::<Vec<_>>() {
                self.follow_of(k).insert(tail);
            }
            e.lastpos.insert(tail);
            self.look().insert(l_pos.loc(), l_pos.loc());
        }
        Ok(e)
    }

    /// Quantifier level: `*`, `+`, `?`, their lazy forms, and `{n,m}`.
    fn parse3(&mut self, begin: bool) -> Result<Expr, Error> {
        let b_pos = Position::new(self.loc);
        let mut e = self.parse4(begin)?;
        let mut c = self.at(self.loc);
        if self.opt.x {
            while c.is_ascii_whitespace() {
                self.loc += 1;
                c = self.at(self.loc);
            }
        }
        if c == b'*' || c == b'+' || c == b'?' {
            if c == b'*' || c == b'?' {
                e.nullable = true;
            }
            self.loc += 1;
            if self.at(self.loc) == b'?' {
                e.lazypos.insert(Position::new(self.loc));
                if e.nullable {
                    lazy(&e.lazypos, &mut e.firstpos);
                }
                self.loc += 1;
            } else {
                greedy(&mut e.firstpos);
            }
            if c == b'+' && !e.nullable && !e.lazypos.is_empty() {
                // One-or-more with a lazy tail: the repeat edge carries
                // the lazy tags, the entry does not.
                let firstpos1 = lazy_copies(&e.lazypos, &e.firstpos);
                for p in &e.lastpos {
                    self.follow
                        .entry(p.pos())
                        .or_default()
                        .extend(firstpos1.iter().copied());
                }
                e.firstpos.extend(firstpos1);
            } else if c == b'*' || c == b'+' {
                for p in &e.lastpos {
                    self.follow
                        .entry(p.pos())
                        .or_default()
                        .extend(e.firstpos.iter().copied());
                }
            }
        } else if c == b'{' {
            self.parse_repeat(b_pos, &mut e)?;
        } else if c == b'}' {
            self.error(ErrorKind::RegexSyntax, "missing {", self.loc)?;
            self.loc += 1;
        }
        Ok(e)
    }

    /// `{n,m}` bounded repetition. The body is virtually unrolled `m-1`
    /// extra times by rewriting `followpos` under shifted iteration
    /// indices; no positions are duplicated in the source.
    fn parse_repeat(&mut self, b_pos: Position, e: &mut Expr) -> Result<(), Error> {
        let mut k: u64 = 0;
        for _ in 0..7 {
            self.loc += 1;
            let c = self.at(self.loc);
            if !c.is_ascii_digit() {
                break;
            }
            k = 10 * k + (c - b'0') as u64;
        }
        if k > IMAX as u64 {
            self.error(ErrorKind::RegexRange, "{min,max} range overflow", self.loc)?;
        }
        let n = k as Index;
        let mut m = n;
        let mut unlimited = false;
        if self.at(self.loc) == b',' {
            if self.at(self.loc + 1).is_ascii_digit() {
                let mut k: u64 = 0;
                for _ in 0..7 {
                    self.loc += 1;
                    let c = self.at(self.loc);
                    if !c.is_ascii_digit() {
                        break;
                    }
                    k = 10 * k + (c - b'0') as u64;
                }
                if k > IMAX as u64 {
                    self.error(ErrorKind::RegexRange, "{min,max} range overflow", self.loc)?;
                }
                m = k as Index;
            } else {
                unlimited = true;
                self.loc += 1;
            }
        }
        if self.at(self.loc) != b'}' {
            return self.error(ErrorKind::RegexSyntax, "malformed range {min,max}", self.loc);
        }
        let nullable1 = e.nullable;
        if n == 0 {
            e.nullable = true;
        }
        if n > m {
            self.error(ErrorKind::RegexRange, "min > max in range {min,max}", self.loc)?;
        }
        self.loc += 1;
        if self.at(self.loc) == b'?' {
            e.lazypos.insert(Position::new(self.loc));
            if e.nullable {
                lazy(&e.lazypos, &mut e.firstpos);
            }
            self.loc += 1;
        } else if n < m && e.lazypos.is_empty() {
            greedy(&mut e.firstpos);
        }
        // With a lazy non-nullable body, stitches repeat from the lazy
        // copies while the plain firstpos remains the entry.
        let firstpos1;
        let pfirstpos = if !e.nullable && !e.lazypos.is_empty() {
            firstpos1 = lazy_copies(&e.lazypos, &e.firstpos);
            &firstpos1
        } else {
            &e.firstpos
        };
        if e.nullable && unlimited {
            // {0,} is plain star closure.
            for p in &e.lastpos {
                self.follow
                    .entry(p.pos())
                    .or_default()
                    .extend(pfirstpos.iter().copied());
            }
        } else if m > 0 {
            if e.iter as u64 * m as u64 >= IMAX as u64 {
                self.error(ErrorKind::RegexRange, "{min,max} range overflow", self.loc)?;
            }
            let iter = e.iter;
            let shift = |i: Index| iter.wrapping_mul(i);
            // Clone the follow entries of every position inside the body
            // (at or after b_pos) under m-1 shifted iteration indices.
            let body: Vec<(Position, Positions)> = self
                .follow
                .iter()
                .filter(|(key, _)| **key >= b_pos)
                .map(|(key, f)| (*key, f.clone()))
                .collect();
            for (key, f) in &body {
                for i in 1..m {
                    self.follow
                        .entry(key.iter(shift(i)))
                        .or_default()
                        .extend(f.iter().map(|p| p.iter(shift(i))));
                }
            }
            // Stitch the clones end to end, and the last clone to itself
            // when the upper bound is unlimited.
            for i in 0..m - 1 {
                for k in e.lastpos.iter().copied().collect::<Vec<_>>() {
                    let key = k.pos().iter(shift(i));
                    let entry = self.follow.entry(key).or_default();
                    entry.extend(pfirstpos.iter().map(|j| j.iter(shift(i).wrapping_add(iter))));
                }
            }
            if unlimited {
                for k in e.lastpos.iter().copied().collect::<Vec<_>>() {
                    let key = k.pos().iter(shift(m).wrapping_sub(iter));
                    let entry = self.follow.entry(key).or_default();
                    entry.extend(pfirstpos.iter().map(|j| j.iter(shift(m).wrapping_sub(iter))));
                }
            }
            if nullable1 {
                // A nullable body lets every clone start the match.
                let firstpos1: Positions = pfirstpos.clone();
                for i in 1..m {
                    for j in &firstpos1 {
                        e.firstpos.insert(j.iter(shift(i)));
                    }
                }
            }
            // Iterations n..m are optional; all of them when nullable.
            let mut lastpos1 = Positions::new();
            let low = if e.nullable { 0 } else { n - 1 };
            for i in low..m {
                for k in &e.lastpos {
                    lastpos1.insert(k.iter(shift(i)));
                }
            }
            e.lastpos = lastpos1;
            e.iter = e.iter.wrapping_mul(m);
        } else {
            // Zero repetitions: the subexpression vanishes.
            e.firstpos.clear();
            e.lastpos.clear();
            e.lazypos.clear();
        }
        Ok(())
    }

    /// Atom level: groups, bracket lists, quoted literals, comments,
    /// plain and escaped characters.
    fn parse4(&mut self, begin: bool) -> Result<Expr, Error> {
        let mut e = Expr { iter: 1, nullable: true, ..Expr::default() };
        let c = self.at(self.loc);
        if c == b'(' {
            self.loc += 1;
            let mut c = c;
            if self.at(self.loc) == b'?' {
                self.loc += 1;
                c = self.at(self.loc);
                if c == b'#' {
                    // (?# comment )
                    loop {
                        self.loc += 1;
                        c = self.at(self.loc);
                        if c == 0 || c == b')' {
                            break;
                        }
                    }
                    if c == b')' {
                        self.loc += 1;
                    }
                } else if c == b'^' {
                    // Negative pattern: matches are flagged for rewind
                    // through the rule-0 redo marker.
                    self.loc += 1;
                    e = self.parse1(begin)?;
                    for p in e.lastpos.iter().copied().collect::<Vec<_>>() {
                        self.follow_of(p).insert(Position::new(0).accept(true));
                    }
                } else if c == b'=' {
                    // (?= lookahead ): head at the `(`, ticked tail at
                    // the `)`.
                    let l_pos = Position::new(self.loc - 2);
                    self.loc += 1;
                    e = self.parse1(begin)?;
                    e.firstpos.insert(l_pos);
                    if e.nullable {
                        e.lastpos.insert(l_pos);
                    }
                    let close = self.loc;
                    let look = self.look();
                    if !look.overlaps(l_pos.loc(), close) {
                        // Nested lookaheads within one rule are dropped.
                        look.insert(l_pos.loc(), close);
                    }
                    let tail = Position::new(close).ticked(true);
                    for p in e.lastpos.iter().copied().collect::<Vec<_>>() {
                        self.follow_of(p).insert(tail);
                    }
                    e.lastpos.insert(tail);
                    if e.nullable {
                        e.firstpos.insert(tail);
                        e.lastpos.insert(l_pos);
                    }
                } else if c == b':' {
                    self.loc += 1;
                    e = self.parse1(begin)?;
                } else {
                    // (?imqslx…) or (?imqslx…:…) modifier group.
                    let m_loc = self.loc;
                    let saved = (self.opt.i, self.opt.q, self.opt.m, self.opt.s, self.opt.x);
                    loop {
                        match c {
                            b'i' => self.opt.i = true,
                            b'l' => self.opt.l = true,
                            b'm' => self.opt.m = true,
                            b'q' => self.opt.q = true,
                            b's' => self.opt.s = true,
                            b'x' => self.opt.x = true,
                            _ => self.error(
                                ErrorKind::RegexSyntax,
                                "unrecognized modifier",
                                self.loc,
                            )?,
                        }
                        self.loc += 1;
                        c = self.at(self.loc);
                        if c == 0 || c == b':' || c == b')' {
                            break;
                        }
                    }
                    if c != 0 {
                        self.loc += 1;
                    }
                    if m_loc == 2 && c == b')' {
                        // Flags at the very start of the pattern apply
                        // globally to the rest of it.
                        e = self.parse2(begin)?;
                    } else {
                        e = self.parse1(begin)?;
                        let mut f_loc = m_loc;
                        loop {
                            let f = self.at(f_loc);
                            f_loc += 1;
                            if f != 0 && f != b'q' && f != b'x' && f != b':' && f != b')' {
                                self.modifiers
                                    .entry(f)
                                    .or_default()
                                    .insert(f_loc, self.loc);
                            }
                            if f == 0 || f == b':' || f == b')' {
                                break;
                            }
                        }
                        (self.opt.i, self.opt.q, self.opt.m, self.opt.s, self.opt.x) = saved;
                    }
                }
            } else {
                e = self.parse1(begin)?;
            }
            if c != b')' {
                if self.at(self.loc) == b')' {
                    self.loc += 1;
                } else {
                    self.error(ErrorKind::RegexSyntax, "missing )", self.loc)?;
                }
            }
        } else if c == b'[' {
            // The whole bracket list is one position; the builder
            // re-reads it when compiling transitions.
            e.firstpos.insert(Position::new(self.loc));
            e.lastpos.insert(Position::new(self.loc));
            e.nullable = false;
            self.loc += 1;
            let mut c = self.at(self.loc);
            if c == b'^' {
                self.loc += 1;
                c = self.at(self.loc);
            }
            while c != 0 {
                if c == b'[' && self.at(self.loc + 1) == b':' {
                    if let Some(c_loc) = self.cur.find_at(self.loc + 2, b':') {
                        if self.at(c_loc + 1) == b']' {
                            self.loc = c_loc + 1;
                        }
                    }
                }
                self.loc += 1;
                c = self.at(self.loc);
                if c == b']' {
                    self.loc += 1;
                    break;
                }
            }
            if c == 0 {
                self.error(ErrorKind::RegexSyntax, "missing ]", self.loc)?;
            }
        } else if (c == b'"' && self.opt.q) || self.escape_at(self.loc) == b'Q' {
            self.parse_quoted(&mut e, c == b'"')?;
        } else if c == b'#' && self.opt.x {
            self.loc += 1;
            loop {
                let c = self.at(self.loc);
                if c == 0 || c == b'\n' {
                    break;
                }
                self.loc += 1;
            }
            if self.at(self.loc) == b'\n' {
                self.loc += 1;
            }
        } else if c == b'/' && self.opt.l && self.opt.x && self.at(self.loc + 1) == b'*' {
            self.loc += 2;
            loop {
                let c = self.at(self.loc);
                if c == 0 || (c == b'*' && self.at(self.loc + 1) == b'/') {
                    break;
                }
                self.loc += 1;
            }
            if self.at(self.loc) != 0 {
                self.loc += 2;
            } else {
                self.error(ErrorKind::RegexSyntax, "missing */", self.loc)?;
            }
        } else if c.is_ascii_whitespace() && self.opt.x {
            self.loc += 1;
        } else if c != 0 && c != b'|' && c != b')' && c != b'?' && c != b'*' && c != b'+' {
            if begin && (c == b'$' || self.escapes_at(self.loc, b"AZBb<>ij") != 0) {
                self.error(ErrorKind::RegexSyntax, "empty pattern", self.loc + 1)?;
            }
            e.firstpos.insert(Position::new(self.loc));
            e.lastpos.insert(Position::new(self.loc));
            e.nullable = false;
            let mut loc = self.loc;
            parse_esc(&self.cur, &self.opt, &mut loc)?;
            self.loc = loc;
        } else if !begin || c != 0 {
            // Empty regex patterns are permitted, empty subpatterns are
            // not.
            self.error(ErrorKind::RegexSyntax, "empty pattern", self.loc)?;
        }
        Ok(e)
    }

    /// A `"…"` or `\Q…\E` literal segment: every content byte becomes a
    /// position chained to the next, and the whole span is recorded as a
    /// quoting scope so the builder treats the bytes literally.
    fn parse_quoted(&mut self, e: &mut Expr, quoted: bool) -> Result<(), Error> {
        if !quoted {
            self.loc += 1;
        }
        let q_loc = self.loc;
        self.loc += 1;
        let at_end = |s: &Self, loc: Location| {
            let c = s.at(loc);
            c == 0
                || (quoted && c == b'"')
                || (!quoted && c == s.opt.e && s.at(loc + 1) == b'E')
        };
        if !at_end(self, self.loc) {
            e.firstpos.insert(Position::new(self.loc));
            let mut p = Position::NPOS;
            loop {
                if quoted && self.at(self.loc) == b'\\' && self.at(self.loc + 1) == b'"' {
                    self.loc += 1;
                }
                if p != Position::NPOS {
                    let cur = Position::new(self.loc);
                    self.follow_of(p).insert(cur);
                }
                p = Position::new(self.loc);
                self.loc += 1;
                if at_end(self, self.loc) {
                    break;
                }
            }
            e.lastpos.insert(p);
            e.nullable = false;
        }
        self.modifiers.entry(b'q').or_default().insert(q_loc, self.loc);
        if self.at(self.loc) != 0 {
            if !quoted {
                self.loc += 1;
            }
            if self.at(self.loc) != 0 {
                self.loc += 1;
            }
        } else {
            self.error(
                ErrorKind::RegexSyntax,
                if quoted { "missing \"" } else { "missing \\E" },
                self.loc,
            )?;
        }
        Ok(())
    }
}
