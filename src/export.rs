/*!
Optional exports of the compiled automaton.

The `f=` option routes output files by suffix: `.gv` receives a
Graphviz rendering of the DFA (written before edge compaction, so the
picture shows the raw construction), and `.h`/`.hpp`/`.cc`/`.cpp`
receive a C array definition of the opcode table with one decoded
comment per word. A filename starting with `+` opens in append mode and
the prefix `stdout.` writes to standard output.
*/

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;

use log::warn;

use crate::chars::{is_meta, meta_label};
use crate::dfa::instr::Instr;
use crate::dfa::Dfa;
use crate::options::Options;
use crate::{Char, Opcode, IMAX};

/// Writes every `.gv` file in the option file list.
pub(crate) fn export_dfa(dfa: &Dfa, opt: &Options) {
    for filename in &opt.f {
        if filename.ends_with(".gv") {
            if let Some(mut out) = open_output(filename) {
                if let Err(err) = write_graphviz(&mut out, dfa, &opt.n) {
                    warn!("cannot write {filename}: {err}");
                }
            }
        }
    }
}

/// Writes every C-source file in the option file list.
pub(crate) fn export_code(code: &[Opcode], opt: &Options) {
    if code.is_empty() {
        return;
    }
    for filename in &opt.f {
        if [".h", ".hpp", ".cc", ".cpp"].iter().any(|s| filename.ends_with(s)) {
            if let Some(mut out) = open_output(filename) {
                if let Err(err) = write_code(&mut out, code, &opt.n) {
                    warn!("cannot write {filename}: {err}");
                }
            }
        }
    }
}

fn open_output(filename: &str) -> Option<Box<dyn Write>> {
    if filename.starts_with("stdout.") {
        return Some(Box::new(io::stdout()));
    }
    let result = if let Some(path) = filename.strip_prefix('+') {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(filename)
    };
    match result {
        Ok(file) => Some(Box::new(file)),
        Err(err) => {
            warn!("cannot open {filename}: {err}");
            None
        }
    }
}

/// Renders the automaton as a directed graph: accepting states doubled,
/// redo states and lookahead heads dashed, meta edges dashed with their
/// symbolic labels.
pub(crate) fn write_graphviz<W: Write>(out: &mut W, dfa: &Dfa, name: &str) -> io::Result<()> {
    let graph = if name.is_empty() { "FSM" } else { name };
    write!(
        out,
        "digraph {graph} {{\n\t\trankdir=LR;\n\t\tconcentrate=true;\n\t\tnode \
         [fontname=\"ArialNarrow\"];\n\t\tedge [fontname=\"Courier\"];\n\n\t\tinit \
         [root=true,peripheries=0,label=\"{name}\",fontname=\"Courier\"];\n\t\tinit -> N0;\n"
    )?;
    for (id, state) in dfa.states.iter().enumerate() {
        if id == 0 {
            write!(out, "\n/*START*/\t")?;
        }
        if state.redo {
            write!(out, "\n/*REDO*/\t")?;
        } else if state.accept != 0 {
            write!(out, "\n/*ACCEPT {}*/\t", state.accept)?;
        }
        for head in &state.heads {
            write!(out, "\n/*HEAD {head}*/\t")?;
        }
        for tail in &state.tails {
            write!(out, "\n/*TAIL {tail}*/\t")?;
        }
        if id != 0 && state.accept == 0 && state.heads.is_empty() && state.tails.is_empty() {
            write!(out, "\n/*STATE*/\t")?;
        }
        write!(out, "N{id} [label=\"")?;
        let mut sep = "";
        for p in &state.positions {
            write!(out, "{sep}{p}")?;
            sep = " ";
        }
        if (state.accept != 0 && !state.redo)
            || !state.heads.is_empty()
            || !state.tails.is_empty()
        {
            write!(out, "\\n")?;
        }
        if state.accept != 0 && !state.redo {
            write!(out, "[{}]", state.accept)?;
        }
        for tail in &state.tails {
            write!(out, "{tail}>")?;
        }
        for head in &state.heads {
            write!(out, "<{head}")?;
        }
        if state.redo {
            writeln!(out, "\",style=dashed,peripheries=1];")?;
        } else if state.accept != 0 {
            writeln!(out, "\",peripheries=2];")?;
        } else if !state.heads.is_empty() {
            writeln!(out, "\",style=dashed,peripheries=2];")?;
        } else {
            writeln!(out, "\"];")?;
        }
        for (&lo, &(hi, target)) in &state.edges {
            let target = match target {
                Some(t) => t as usize,
                None => continue,
            };
            if !is_meta(lo) {
                write!(out, "\t\tN{id} -> N{target} [label=\"")?;
                write_gv_char(out, lo)?;
                if lo != hi {
                    write!(out, "-")?;
                    write_gv_char(out, hi)?;
                }
                writeln!(out, "\"];")?;
            } else {
                for meta in lo..=hi {
                    writeln!(
                        out,
                        "\t\tN{id} -> N{target} [label=\"{}\",style=\"dashed\"];",
                        meta_label(meta)
                    )?;
                }
            }
        }
        if state.redo {
            writeln!(out, "\t\tN{id} -> R{id};\n\t\tR{id} [peripheries=0,label=\"redo\"];")?;
        }
    }
    writeln!(out, "}}")?;
    Ok(())
}

fn write_gv_char<W: Write>(out: &mut W, c: Char) -> io::Result<()> {
    let c = c as u8;
    match c {
        0x07..=0x0D => write!(out, "\\\\{}", b"abtnvfr"[(c - 0x07) as usize] as char),
        b'"' => write!(out, "\\\""),
        b'\\' => write!(out, "\\\\"),
        c if c.is_ascii_graphic() => write!(out, "{}", c as char),
        c if c < 8 => write!(out, "\\\\{c}"),
        c => write!(out, "\\\\x{c:02x}"),
    }
}

/// Writes the opcode table as a C array with one decoded comment per
/// word, guarded so the declaration can be overridden by the including
/// build.
pub(crate) fn write_code<W: Write>(out: &mut W, code: &[Opcode], name: &str) -> io::Result<()> {
    let name = if name.is_empty() { "FSM" } else { name };
    write!(
        out,
        "#ifndef REDFA_CODE_DECL\n#define REDFA_CODE_DECL const unsigned int\n#endif\n\n\
         REDFA_CODE_DECL redfa_code_{name}[{}] =\n{{\n",
        code.len()
    )?;
    for (i, &op) in code.iter().enumerate() {
        write!(out, "  0x{op:08X}, // {i}: ")?;
        match Instr::decode(op) {
            Instr::Redo => writeln!(out, "REDO")?,
            Instr::Take(rule) => writeln!(out, "TAKE {rule}")?,
            Instr::Tail(index) => writeln!(out, "TAIL {index}")?,
            Instr::Head(index) => writeln!(out, "HEAD {index}")?,
            Instr::Goto { lo, hi, target } => {
                if target == IMAX {
                    write!(out, "HALT ON ")?;
                } else {
                    write!(out, "GOTO {target} ON ")?;
                }
                if !is_meta(lo) {
                    write_c_char(out, lo)?;
                    if lo != hi {
                        write!(out, "-")?;
                        write_c_char(out, hi)?;
                    }
                } else {
                    write!(out, "{}", meta_label(lo))?;
                }
                writeln!(out)?;
            }
        }
    }
    write!(out, "}};\n\n")?;
    Ok(())
}

fn write_c_char<W: Write>(out: &mut W, c: Char) -> io::Result<()> {
    let c = c as u8;
    match c {
        0x07..=0x0D => write!(out, "\\{}", b"abtnvfr"[(c - 0x07) as usize] as char),
        b'\\' => write!(out, "'\\'"),
        c if c.is_ascii_graphic() => write!(out, "{}", c as char),
        c if c < 8 => write!(out, "\\{c}"),
        c => write!(out, "\\x{c:02x}"),
    }
}
