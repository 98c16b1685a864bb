/*!
This crate compiles regular expressions into deterministic finite
automata encoded as compact opcode tables for table-driven matchers.

Compilation follows the McNaughton-Yamada-Glushkov construction: the
parser computes the classical position functions (`firstpos`,
`lastpos`, `nullable`, `followpos`) directly while walking the
pattern, the DFA builder turns position sets into states keyed by set
equality, and the encoder lays the states out as a flat array of
32-bit opcodes. A top-level
alternation `p1|p2|…` compiles every alternative as its own accepting
rule, so one table can drive a whole lexer.

The opcode array is the external interface: a matcher jumps through it
by index and never sees the construction. Compilation is synchronous
and single-threaded; the finished table is immutable and can be shared
freely.

```
use redfa::Pattern;

let pattern = Pattern::new("if|else|[a-z]+").unwrap();
assert_eq!(pattern.rules(), 3);
assert_eq!(pattern.subpattern(2), "else");
assert!(pattern.reachable(3));
let table: &[u32] = pattern.opcodes();
assert!(!table.is_empty());
```

Options control the dialect (case folding, multi-line anchors, lexer
lookahead, free spacing, …) and the optional exports: a Graphviz view
of the automaton and a C source rendering of the table. See
[`Pattern::with_options`].
*/

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

mod chars;
mod dfa;
mod errors;
mod export;
mod options;
mod parser;
mod position;
mod ranges;
mod source;

pub use errors::Error;
pub use errors::ErrorKind;
pub use errors::SerializationError;

use options::Options;

/// Offset into the pattern source.
pub(crate) type Location = u32;

/// Rule numbers, lookahead ordinals and opcode offsets.
pub(crate) type Index = u16;

/// Largest [`Index`]; as an opcode target it means "halt".
pub(crate) const IMAX: Index = 0xFFFF;

/// A byte of the alphabet or a meta symbol above `0xFF`.
pub(crate) type Char = u16;

/// One encoded instruction of the compiled automaton.
pub type Opcode = u32;

/// Magic prefix of serialized compiled patterns.
const MAGIC: &[u8; 4] = b"RDFA";

/// A compiled pattern: the opcode table plus the bookkeeping needed to
/// relate it back to its source.
///
/// [`Pattern::new`] compiles with errors raised to the caller. The
/// permissive option-driven policy, where errors are only raised under
/// option `r` and printed under `w`, is available through
/// [`Pattern::with_options`].
#[derive(Debug)]
pub struct Pattern {
    rex: String,
    opt: Options,
    /// End offset of each top-level alternative.
    end: Vec<Location>,
    /// Per-rule acceptance reachability.
    acc: Vec<bool>,
    opc: Vec<Opcode>,
    nodes: usize,
    edges: usize,
}

impl Pattern {
    /// Compiles `regex`, raising any compilation error.
    pub fn new(regex: impl AsRef<str>) -> Result<Pattern, Error> {
        Pattern::compile(regex.as_ref(), "r")
    }

    /// Compiles `regex` under an option string, e.g. `"imx"` or
    /// `"r;n=lexer;f=lexer.gv,lexer.h"`.
    ///
    /// Errors are returned only under option `r`, printed to stderr
    /// under `w`, and otherwise recorded-and-ignored with compilation
    /// continuing best-effort; a table overflow is always an error.
    pub fn with_options(regex: impl AsRef<str>, options: &str) -> Result<Pattern, Error> {
        Pattern::compile(regex.as_ref(), options)
    }

    fn compile(rex: &str, options: &str) -> Result<Pattern, Error> {
        let opt = Options::parse(options);
        let parsed = parser::Parser::new(rex.as_bytes(), opt).parse()?;
        let rules = parsed.end.len();
        // Parsing may have promoted inline flags to global options.
        let opt = parsed.opt;
        let builder = dfa::Builder::new(
            rex.as_bytes(),
            &opt,
            parsed.followpos,
            parsed.modifiers,
            parsed.lookahead,
            rules,
        );
        let mut dfa = builder.build(parsed.startpos)?;
        export::export_dfa(&dfa, &opt);
        dfa::compact_dfa(&mut dfa);
        let opc = dfa::encode::encode_dfa(&mut dfa, &opt, rex.as_bytes())?;
        export::export_code(&opc, &opt);
        Ok(Pattern {
            rex: rex.to_string(),
            end: parsed.end,
            acc: dfa.acc,
            opc,
            nodes: dfa.states.len(),
            edges: dfa.edge_count,
            opt,
        })
    }

    /// Number of top-level alternatives, each an accepting rule.
    pub fn rules(&self) -> usize {
        self.end.len()
    }

    /// Source text of rule `choice` (1-based); `0` returns the whole
    /// pattern, anything out of range the empty string.
    pub fn subpattern(&self, choice: Index) -> &str {
        if choice == 0 {
            return &self.rex;
        }
        let choice = choice as usize;
        if choice > self.end.len() {
            return "";
        }
        let end = self.end[choice - 1] as usize;
        let start = if choice >= 2 { self.end[choice - 2] as usize + 1 } else { 0 };
        self.rex.get(start..end).unwrap_or("")
    }

    /// True if some reachable state accepts rule `choice` (1-based).
    pub fn reachable(&self, choice: Index) -> bool {
        choice >= 1 && self.acc.get(choice as usize - 1).copied().unwrap_or(false)
    }

    /// The encoded automaton.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.opc
    }

    /// Number of DFA states.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Number of DFA transitions, one per covered byte or meta symbol.
    pub fn edges(&self) -> usize {
        self.edges
    }

    /// Table name set through the `n=` option.
    pub fn name(&self) -> &str {
        &self.opt.n
    }

    /// Writes the compiled tables so they can be [loaded](Pattern::load)
    /// later without recompiling.
    pub fn save<W: Write>(&self, mut writer: W) -> Result<(), SerializationError> {
        writer.write_all(MAGIC)?;
        let tables = Tables {
            rex: self.rex.clone(),
            end: self.end.clone(),
            acc: self.acc.clone(),
            opc: self.opc.clone(),
            name: self.opt.n.clone(),
            nodes: self.nodes,
            edges: self.edges,
        };
        bincode::serialize_into(writer, &tables)?;
        Ok(())
    }

    /// Reads back a compiled pattern written by [`Pattern::save`].
    pub fn load<R: Read>(mut reader: R) -> Result<Pattern, SerializationError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(SerializationError::InvalidFormat);
        }
        let tables: Tables = bincode::deserialize_from(reader)?;
        let opt = Options { n: tables.name, ..Options::default() };
        Ok(Pattern {
            rex: tables.rex,
            end: tables.end,
            acc: tables.acc,
            opc: tables.opc,
            nodes: tables.nodes,
            edges: tables.edges,
            opt,
        })
    }
}

/// Serialized payload of a compiled pattern.
#[derive(Serialize, Deserialize)]
struct Tables {
    rex: String,
    end: Vec<Location>,
    acc: Vec<bool>,
    opc: Vec<Opcode>,
    name: String,
    nodes: usize,
    edges: usize,
}

#[cfg(test)]
mod tests {
    use super::Pattern;
    use pretty_assertions::assert_eq;

    #[test]
    fn subpattern_recovers_rule_sources() {
        let pattern = Pattern::new("foo|ba+r|[0-9]+").unwrap();
        assert_eq!(pattern.rules(), 3);
        assert_eq!(pattern.subpattern(0), "foo|ba+r|[0-9]+");
        assert_eq!(pattern.subpattern(1), "foo");
        assert_eq!(pattern.subpattern(2), "ba+r");
        assert_eq!(pattern.subpattern(3), "[0-9]+");
        assert_eq!(pattern.subpattern(4), "");
    }

    #[test]
    fn reachability_vector() {
        let pattern = Pattern::new("a|b").unwrap();
        assert!(pattern.reachable(1));
        assert!(pattern.reachable(2));
        assert!(!pattern.reachable(0));
        assert!(!pattern.reachable(3));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let pattern = Pattern::with_options("ab*c", "r;n=toy").unwrap();
        let mut buffer = Vec::new();
        pattern.save(&mut buffer).unwrap();
        let loaded = Pattern::load(buffer.as_slice()).unwrap();
        assert_eq!(loaded.opcodes(), pattern.opcodes());
        assert_eq!(loaded.rules(), 1);
        assert_eq!(loaded.name(), "toy");
        assert_eq!(loaded.nodes(), pattern.nodes());
    }

    #[test]
    fn load_rejects_foreign_data() {
        assert!(matches!(
            Pattern::load(&b"not a table"[..]),
            Err(crate::SerializationError::InvalidFormat)
        ));
    }

    #[test]
    fn name_from_options() {
        let pattern = Pattern::with_options("x", "r;n=scanner").unwrap();
        assert_eq!(pattern.name(), "scanner");
    }
}
