/*!
Read-only cursor over the pattern source.

The parser and the DFA builder both walk the pattern text: the parser to
discover structure, the builder to re-expand atoms (bracket lists,
escapes) into byte sets when transitions are compiled. Both go through
this cursor, which never mutates the source; all advancing happens by
moving a [`Location`] value.
*/

use crate::errors::{report, Error, ErrorKind};
use crate::options::Options;
use crate::Location;

/// Bounds-checked view over the pattern bytes.
#[derive(Clone, Copy)]
pub(crate) struct Cursor<'a> {
    rex: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(rex: &'a [u8]) -> Self {
        Cursor { rex }
    }

    pub fn rex(&self) -> &'a [u8] {
        self.rex
    }

    /// Byte at `loc`, `0` past the end.
    #[inline]
    pub fn at(&self, loc: Location) -> u8 {
        self.rex.get(loc as usize).copied().unwrap_or(0)
    }

    /// True if the source at `loc` starts with `s`.
    pub fn eq_at(&self, loc: Location, s: &str) -> bool {
        self.rex[self.rex.len().min(loc as usize)..].starts_with(s.as_bytes())
    }

    /// First occurrence of `c` at or after `loc`.
    pub fn find_at(&self, loc: Location, c: u8) -> Option<Location> {
        self.rex[self.rex.len().min(loc as usize)..]
            .iter()
            .position(|&b| b == c)
            .map(|i| loc + i as Location)
    }

    /// The escape letter when `loc` holds the escape character followed
    /// by one, `0` otherwise.
    #[inline]
    pub fn escape_at(&self, loc: Location, esc: u8) -> u8 {
        if esc != 0 && self.at(loc) == esc {
            self.at(loc + 1)
        } else {
            0
        }
    }

    /// Like [`Cursor::escape_at`], but only for letters in `set`.
    pub fn escapes_at(&self, loc: Location, set: &[u8], esc: u8) -> u8 {
        let c = self.escape_at(loc, esc);
        if c != 0 && set.contains(&c) {
            c
        } else {
            0
        }
    }
}

/// Advances `loc` past one atom character, consuming the full syntactic
/// form of an escape when one starts there: `\0ooo`, `\xHH`, `\x{H…}`,
/// `\u{H…}`, `\p{Name}`, `\cX`, or a single-letter escape.
pub(crate) fn parse_esc(
    cur: &Cursor,
    opt: &Options,
    loc: &mut Location,
) -> Result<(), Error> {
    let escaped = cur.at(*loc) == opt.e && opt.e != 0;
    *loc += 1;
    let c = cur.at(*loc);
    if escaped && c != 0 {
        if c == b'0' {
            *loc += 1;
            for _ in 0..3 {
                if !cur.at(*loc).is_ascii_digit() {
                    break;
                }
                *loc += 1;
            }
        } else if c == b'p' && cur.at(*loc + 1) == b'{' {
            *loc += 1;
            loop {
                *loc += 1;
                if !cur.at(*loc).is_ascii_alphanumeric() {
                    break;
                }
            }
            if cur.at(*loc) == b'}' {
                *loc += 1;
            } else {
                report(opt, cur.rex(), ErrorKind::RegexSyntax, "malformed \\p{}", *loc)?;
            }
        } else if c == b'u' && cur.at(*loc + 1) == b'{' {
            *loc += 1;
            loop {
                *loc += 1;
                if !cur.at(*loc).is_ascii_hexdigit() {
                    break;
                }
            }
            if cur.at(*loc) == b'}' {
                *loc += 1;
            } else {
                report(opt, cur.rex(), ErrorKind::RegexSyntax, "malformed \\u{}", *loc)?;
            }
        } else if c == b'x' && cur.at(*loc + 1) == b'{' {
            *loc += 1;
            loop {
                *loc += 1;
                if !cur.at(*loc).is_ascii_hexdigit() {
                    break;
                }
            }
            if cur.at(*loc) == b'}' {
                *loc += 1;
            } else {
                report(opt, cur.rex(), ErrorKind::RegexSyntax, "malformed \\x{}", *loc)?;
            }
        } else if c == b'x' {
            *loc += 1;
            for _ in 0..2 {
                if !cur.at(*loc).is_ascii_hexdigit() {
                    break;
                }
                *loc += 1;
            }
        } else {
            if c == b'c' {
                *loc += 1;
            }
            if cur.at(*loc) != 0 {
                *loc += 1;
            } else {
                report(opt, cur.rex(), ErrorKind::RegexSyntax, "malformed \\c", *loc)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn advance(rex: &str) -> Location {
        let cur = Cursor::new(rex.as_bytes());
        let opt = Options::default();
        let mut loc = 0;
        parse_esc(&cur, &opt, &mut loc).unwrap();
        loc
    }

    #[test]
    fn cursor_basics() {
        let cur = Cursor::new(b"a|bc");
        assert_eq!(cur.at(0), b'a');
        assert_eq!(cur.at(4), 0);
        assert!(cur.eq_at(2, "bc"));
        assert!(!cur.eq_at(2, "bd"));
        assert_eq!(cur.find_at(1, b'c'), Some(3));
        assert_eq!(cur.find_at(1, b'z'), None);
    }

    #[test]
    fn escape_lookup() {
        let cur = Cursor::new(b"\\bx");
        assert_eq!(cur.escape_at(0, b'\\'), b'b');
        assert_eq!(cur.escape_at(1, b'\\'), 0);
        assert_eq!(cur.escape_at(0, 0), 0, "disabled escapes never match");
        assert_eq!(cur.escapes_at(0, b"ABb<>", b'\\'), b'b');
        assert_eq!(cur.escapes_at(0, b"AZ", b'\\'), 0);
    }

    #[test]
    fn atom_advance() {
        assert_eq!(advance("a.."), 1, "plain atom is one byte");
        assert_eq!(advance("\\n."), 2);
        assert_eq!(advance("\\0101."), 5);
        assert_eq!(advance("\\01."), 3);
        assert_eq!(advance("\\x41."), 4);
        assert_eq!(advance("\\x{2a}."), 6);
        assert_eq!(advance("\\u{2a}."), 6);
        assert_eq!(advance("\\p{Digit}."), 9);
        assert_eq!(advance("\\cA."), 3);
    }

    #[test]
    fn malformed_escape_reports_under_r() {
        let cur = Cursor::new(b"\\p{digit");
        let opt = Options::parse("r");
        let mut loc = 0;
        let err = parse_esc(&cur, &opt, &mut loc).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::RegexSyntax);
    }
}
