/*!
The 32-bit opcode forms consumed by table-driven matchers.

A compiled pattern is a flat array of `u32` words, one instruction each.
Byte-range jumps pack their bounds into the two high bytes and the
target into the low half-word:

```text
GOTO lo-hi  →  lo << 24 | hi << 16 | target        (lo <= hi)
```

Every other form lives in the encoding space a byte range cannot reach,
`lo > hi`:

```text
GOTO meta   →  0xFF << 24 | (meta - 0x100) << 16 | target
TAKE rule   →  0xFE << 24 | rule
REDO        →  0xFD << 24
TAIL index  →  0xFC << 24 | index
HEAD index  →  0xFB << 24 | index
```

A target of `0xFFFF` (`IMAX`) means "halt here"; the canonical [`HALT`] word is
the catch-all jump `GOTO 0x00-0xFF` with that target. Meta offsets stay
below `0xFF`, so a `0xFF…` word with a second byte of `0xFF` is the
one-byte range `GOTO 0xFF-0xFF` and nothing else.
*/

use crate::chars::{is_meta, META_MIN};
use crate::{Char, Index, Opcode};

/// Catch-all halt: `GOTO 0x00-0xFF` to the halt target.
pub const HALT: Opcode = 0x00FF_FFFF;

pub(crate) fn opcode_goto(lo: Char, hi: Char, index: Index) -> Opcode {
    if is_meta(lo) {
        0xFF00_0000 | ((lo - META_MIN) as Opcode) << 16 | index as Opcode
    } else {
        (lo as Opcode) << 24 | (hi as Opcode) << 16 | index as Opcode
    }
}

pub(crate) fn opcode_take(rule: Index) -> Opcode {
    0xFE00_0000 | rule as Opcode
}

pub(crate) fn opcode_redo() -> Opcode {
    0xFD00_0000
}

pub(crate) fn opcode_tail(index: Index) -> Opcode {
    0xFC00_0000 | index as Opcode
}

pub(crate) fn opcode_head(index: Index) -> Opcode {
    0xFB00_0000 | index as Opcode
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Instr {
    /// Accept the match as the given rule.
    Take(Index),
    /// Accept as a negative-pattern sentinel; the matcher rewinds.
    Redo,
    /// Lookahead exit marker.
    Tail(Index),
    /// Lookahead entry marker.
    Head(Index),
    /// Jump to `target` on a byte in `lo..=hi`, or on the meta symbol
    /// `lo` when `lo == hi >= 0x100`. A target of `IMAX` halts.
    Goto { lo: Char, hi: Char, target: Index },
}

impl Instr {
    pub fn decode(op: Opcode) -> Instr {
        let top = (op >> 24) as u8;
        let second = (op >> 16) as u8;
        let index = op as Index;
        match (top, second) {
            (0xFE, 0x00) => Instr::Take(index),
            (0xFD, 0x00) => Instr::Redo,
            (0xFC, 0x00) => Instr::Tail(index),
            (0xFB, 0x00) => Instr::Head(index),
            (0xFF, s) if s < 0xFF => {
                let meta = META_MIN + s as Char;
                Instr::Goto { lo: meta, hi: meta, target: index }
            }
            _ => Instr::Goto { lo: top as Char, hi: second as Char, target: index },
        }
    }
}
