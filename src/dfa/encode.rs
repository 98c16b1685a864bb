/*!
Opcode emission.

Encoding is two passes over the state list. The first counts opcodes and
assigns every state its offset: one word per byte edge, one per meta
symbol covered by a meta edge, one per lookahead head and tail, one for
the accept or redo marker, and — when the state's byte edges do not
already cover the alphabet contiguously from zero — one catch-all halt
edge. The second pass emits the words.

Edges are written in reverse interval order so a matcher scanning the
state's words linearly meets lower byte ranges first; the catch-all halt
edge therefore comes out last and acts as the fallthrough.
*/

use log::debug;

use crate::chars::is_meta;
use crate::dfa::instr::{opcode_goto, opcode_head, opcode_redo, opcode_tail, opcode_take};
use crate::dfa::Dfa;
use crate::errors::{report, Error, ErrorKind};
use crate::options::Options;
use crate::{Char, Index, Opcode, IMAX};

/// Assigns state offsets and encodes the automaton into opcodes.
/// Fails with [`ErrorKind::CodeOverflow`] when the table would exceed
/// the addressable index range; that error is raised regardless of the
/// error policy.
pub(crate) fn encode_dfa(dfa: &mut Dfa, opt: &Options, rex: &[u8]) -> Result<Vec<Opcode>, Error> {
    let mut nop: u32 = 0;
    for state in &mut dfa.states {
        state.index = nop as Index;
        // `hi` tracks contiguous byte coverage from 0; a state covering
        // the whole alphabet needs no catch-all.
        let mut hi: Char = 0;
        for (&lo, &(edge_hi, _)) in &state.edges {
            if lo == hi {
                hi = edge_hi + 1;
            }
            nop += 1;
            if is_meta(lo) {
                nop += (edge_hi - lo) as u32;
            }
        }
        if hi <= 0xFF {
            state.edges.insert(hi, (0xFF, None));
            nop += 1;
        }
        nop += (state.heads.len()
            + state.tails.len()
            + usize::from(state.accept > 0 || state.redo)) as u32;
        if nop > IMAX as u32 {
            report(opt, rex, ErrorKind::CodeOverflow, "out of code memory", 0)?;
        }
    }
    let mut code = Vec::with_capacity(nop as usize);
    for state in &dfa.states {
        if state.redo {
            code.push(opcode_redo());
        } else if state.accept > 0 {
            code.push(opcode_take(state.accept));
        }
        for &tail in &state.tails {
            code.push(opcode_tail(tail));
        }
        for &head in &state.heads {
            code.push(opcode_head(head));
        }
        for (&lo, &(edge_hi, target)) in state.edges.iter().rev() {
            let index =
                target.map_or(IMAX, |id| dfa.states[id as usize].index);
            if !is_meta(lo) {
                code.push(opcode_goto(lo, edge_hi, index));
            } else {
                // Meta ranges expand to one single-point opcode each.
                for meta in lo..=edge_hi {
                    code.push(opcode_goto(meta, meta, index));
                }
            }
        }
    }
    debug_assert_eq!(code.len(), nop as usize);
    debug!("encoded {} opcode(s)", code.len());
    Ok(code)
}
