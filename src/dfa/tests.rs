use pretty_assertions::assert_eq;

use super::instr::{opcode_goto, opcode_head, opcode_redo, opcode_tail, opcode_take, Instr, HALT};
use super::{compact_dfa, Builder, Dfa};
use crate::chars::{is_meta, META_BOB, META_BOL, META_BWB, META_DED, META_EWB, META_IND};
use crate::dfa::encode::encode_dfa;
use crate::errors::ErrorKind;
use crate::options::Options;
use crate::parser::Parser;
use crate::{Char, Index, Opcode, Pattern, IMAX};

/// Parses and builds the automaton, stopping before encoding.
fn build_dfa(rex: &str, options: &str) -> Dfa {
    let opt = Options::parse(options);
    let parsed = Parser::new(rex.as_bytes(), opt).parse().unwrap();
    let rules = parsed.end.len();
    let opt = parsed.opt;
    Builder::new(
        rex.as_bytes(),
        &opt,
        parsed.followpos,
        parsed.modifiers,
        parsed.lookahead,
        rules,
    )
    .build(parsed.startpos)
    .unwrap()
}

fn compile(rex: &str, options: &str) -> Vec<Opcode> {
    Pattern::with_options(rex, options).unwrap().opcodes().to_vec()
}

/// Minimal table interpreter for byte inputs: follows byte jumps,
/// records the last accepting rule, halts on the fallthrough. Meta
/// edges and lookahead markers are skipped; patterns exercising them
/// are checked structurally instead.
fn run(code: &[Opcode], input: &[u8]) -> Option<(Index, usize)> {
    let mut pc = 0usize;
    let mut pos = 0usize;
    let mut best = None;
    'state: loop {
        loop {
            match Instr::decode(code[pc]) {
                Instr::Take(rule) => {
                    best = Some((rule, pos));
                    pc += 1;
                }
                Instr::Redo | Instr::Tail(_) | Instr::Head(_) => pc += 1,
                Instr::Goto { lo, hi, target } => {
                    if is_meta(lo) {
                        pc += 1;
                        continue;
                    }
                    let Some(&byte) = input.get(pos) else {
                        return best;
                    };
                    if (lo..=hi).contains(&(byte as Char)) {
                        if target == IMAX {
                            return best;
                        }
                        pos += 1;
                        pc = target as usize;
                        continue 'state;
                    }
                    pc += 1;
                }
            }
        }
    }
}

fn gotos(code: &[Opcode]) -> Vec<(Char, Char, Index)> {
    code.iter()
        .filter_map(|&op| match Instr::decode(op) {
            Instr::Goto { lo, hi, target } => Some((lo, hi, target)),
            _ => None,
        })
        .collect()
}

#[test]
fn single_atom_code() {
    // Start state: jump on `a`, fall through to halt. Accept state:
    // take rule 1, halt.
    assert_eq!(
        compile("a", "r"),
        vec![
            opcode_goto(0x61, 0x61, 2),
            HALT,
            opcode_take(1),
            HALT,
        ]
    );
    let code = compile("a", "r");
    assert_eq!(run(&code, b"a"), Some((1, 1)));
    assert_eq!(run(&code, b"ab"), Some((1, 1)));
    assert_eq!(run(&code, b"b"), None);
}

#[test]
fn alternation_rules_are_distinct() {
    let pattern = Pattern::new("a|b").unwrap();
    assert_eq!(pattern.nodes(), 3);
    let code = pattern.opcodes();
    assert_eq!(run(code, b"a"), Some((1, 1)));
    assert_eq!(run(code, b"b"), Some((2, 1)));
    assert_eq!(run(code, b"c"), None);
}

#[test]
fn star_self_loop() {
    let pattern = Pattern::new("a*").unwrap();
    // The successor set of the loop equals the start set, so the
    // automaton is a single accepting state.
    assert_eq!(pattern.nodes(), 1);
    let code = pattern.opcodes();
    assert_eq!(code, &[opcode_take(1), opcode_goto(0x61, 0x61, 0), HALT]);
    assert_eq!(run(code, b""), Some((1, 0)));
    assert_eq!(run(code, b"aaa"), Some((1, 3)));
    assert_eq!(run(code, b"b"), Some((1, 0)));
}

#[test]
fn lazy_star_defers_matching() {
    let code = compile("a*?b", "r");
    // The lazy star must not accept at the start.
    assert_eq!(run(&code, b""), None);
    assert_eq!(run(&code, b"b"), Some((1, 1)));
    assert_eq!(run(&code, b"ab"), Some((1, 2)));
    assert_eq!(run(&code, b"aab"), Some((1, 3)));
    // The accept state has no outgoing match, so the shortest match
    // wins over a longer one.
    assert_eq!(run(&code, b"abb"), Some((1, 2)));
}

#[test]
fn bounded_repeat_counts() {
    let pattern = Pattern::new("a{2,3}").unwrap();
    assert_eq!(pattern.nodes(), 4);
    let code = pattern.opcodes();
    assert_eq!(run(code, b"a"), None);
    assert_eq!(run(code, b"aa"), Some((1, 2)));
    assert_eq!(run(code, b"aaa"), Some((1, 3)));
    assert_eq!(run(code, b"aaaa"), Some((1, 3)));
}

#[test]
fn unbounded_repeat_tail() {
    let code = compile("a{2,}", "r");
    assert_eq!(run(&code, b"a"), None);
    assert_eq!(run(&code, b"aa"), Some((1, 2)));
    assert_eq!(run(&code, b"aaaaa"), Some((1, 5)));
}

#[test]
fn posix_digit_class() {
    let code = compile("[[:digit:]]+", "r");
    assert!(gotos(&code).contains(&(0x30, 0x39, 2)) || gotos(&code).iter().any(|&(lo, hi, _)| lo == 0x30 && hi == 0x39));
    assert_eq!(run(&code, b"42x"), Some((1, 2)));
    assert_eq!(run(&code, b"x"), None);
}

#[test]
fn case_insensitive_global_modifier() {
    let code = compile("(?i)AbC", "r");
    assert_eq!(run(&code, b"abc"), Some((1, 3)));
    assert_eq!(run(&code, b"ABC"), Some((1, 3)));
    assert_eq!(run(&code, b"AbC"), Some((1, 3)));
    assert_eq!(run(&code, b"abd"), None);
    // Each step carries both cases of its letter.
    let first: Vec<_> = gotos(&code)
        .into_iter()
        .filter(|&(lo, _, target)| target != IMAX && (lo == 0x41 || lo == 0x61))
        .collect();
    assert_eq!(first.len(), 2);
}

#[test]
fn slash_lookahead_heads_and_tails() {
    let code = compile("ab/cd", "rl");
    let take_at = code.iter().position(|&op| op == opcode_take(1)).unwrap();
    // The accepting state records the lookahead exit right after the
    // accept marker.
    assert_eq!(code[take_at + 1], opcode_tail(0));
    assert!(code.contains(&opcode_head(0)));
    assert_eq!(run(&code, b"abcd"), Some((1, 4)));
    assert_eq!(run(&code, b"abce"), None);
}

#[test]
fn group_lookahead_heads_and_tails() {
    let code = compile("ab(?=cd)", "r");
    assert!(code.contains(&opcode_head(0)));
    assert!(code.contains(&opcode_tail(0)));
}

#[test]
fn repeat_overflow_is_an_error() {
    let err = Pattern::new("a{8000000}").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegexRange);
}

#[test]
fn inverted_list_is_an_error() {
    let err = Pattern::new("[z-a]").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RegexList);
}

#[test]
fn negative_pattern_emits_redo() {
    let code = compile("(?^ab)", "r");
    assert!(code.contains(&opcode_redo()));
    assert!(!code.contains(&opcode_take(1)));
}

#[test]
fn anchors_become_meta_edges() {
    let code = compile("^a", "r");
    assert!(gotos(&code).iter().any(|&(lo, _, _)| lo == META_BOB));
    // Multi-line mode anchors to line begins instead.
    let code = compile("^a", "rm");
    assert!(gotos(&code).iter().any(|&(lo, _, _)| lo == META_BOL));
}

#[test]
fn word_boundary_meta_range_expands() {
    let code = compile("\\ba", "r");
    let metas: Vec<_> = gotos(&code).into_iter().filter(|&(lo, _, _)| is_meta(lo)).collect();
    // BWB-EWB expands to one single-point opcode per meta symbol.
    assert!(metas.iter().any(|&(lo, hi, _)| lo == META_BWB && hi == META_BWB));
    assert!(metas.iter().any(|&(lo, hi, _)| lo == META_EWB && hi == META_EWB));
}

#[test]
fn indent_dedent_escapes() {
    let code = compile("\\i|\\j", "r");
    assert!(gotos(&code).iter().any(|&(lo, _, _)| lo == META_IND));
    assert!(gotos(&code).iter().any(|&(lo, _, _)| lo == META_DED));
}

#[test]
fn dot_excludes_newline_without_dotall() {
    let code = compile(".", "r");
    let ranges: Vec<_> = gotos(&code)
        .into_iter()
        .filter(|&(_, _, target)| target != IMAX)
        .collect();
    assert_eq!(ranges.iter().map(|&(lo, hi, _)| (lo, hi)).collect::<Vec<_>>(), vec![(0x0B, 0xFF), (0x00, 0x09)]);
    let code = compile(".", "rs");
    let ranges: Vec<_> = gotos(&code)
        .into_iter()
        .filter(|&(_, _, target)| target != IMAX)
        .collect();
    assert_eq!(ranges.iter().map(|&(lo, hi, _)| (lo, hi)).collect::<Vec<_>>(), vec![(0x00, 0xFF)]);
}

#[test]
fn accept_prefers_lowest_rule() {
    let pattern = Pattern::new("a|a").unwrap();
    let code = pattern.opcodes();
    assert_eq!(run(code, b"a"), Some((1, 1)));
    assert!(pattern.reachable(1));
    // Rule 2 can never win the shared accepting state.
    assert!(!pattern.reachable(2));
}

#[test]
fn determinism() {
    for rex in ["a|b", "a*?b", "(?i)[a-f]{2,4}x", "ab/cd"] {
        let first = compile(rex, "rl");
        let second = compile(rex, "rl");
        assert_eq!(first, second, "pattern {rex:?}");
    }
}

#[test]
fn state_identity_dedups_successors() {
    // The loop successor set equals the start set; no second state.
    assert_eq!(Pattern::new("a*").unwrap().nodes(), 1);
    assert_eq!(Pattern::new("[ab]*").unwrap().nodes(), 1);
}

#[test]
fn edges_stay_disjoint() {
    for rex in ["a|b", "[a-c]|b", "(?i)AbC", "[a-m]x|[k-z]y", ".a"] {
        let mut dfa = build_dfa(rex, "r");
        compact_dfa(&mut dfa);
        for state in &dfa.states {
            let mut prev_hi: Option<Char> = None;
            for (&lo, &(hi, _)) in &state.edges {
                assert!(lo <= hi);
                if let Some(prev) = prev_hi {
                    assert!(lo > prev, "overlapping edges in {rex:?}");
                }
                prev_hi = Some(hi);
            }
        }
    }
}

#[test]
fn compactor_merges_adjacent_same_target() {
    let mut dfa = build_dfa("a", "r");
    let state = &mut dfa.states[0];
    state.edges.clear();
    state.edges.insert(0x61, (0x62, Some(1)));
    state.edges.insert(0x63, (0x64, Some(1)));
    state.edges.insert(0x65, (0x65, Some(0)));
    compact_dfa(&mut dfa);
    let edges: Vec<_> = dfa.states[0].edges.iter().map(|(&lo, &e)| (lo, e)).collect();
    assert_eq!(edges, vec![(0x61, (0x64, Some(1))), (0x65, (0x65, Some(0)))]);
}

#[test]
fn compactor_is_idempotent() {
    for rex in ["a|b", "(?i)[a-f]{2,4}x", "[a-c]|b", "a*?b"] {
        let mut once = build_dfa(rex, "r");
        compact_dfa(&mut once);
        let snapshot: Vec<Vec<_>> = once
            .states
            .iter()
            .map(|s| s.edges.iter().map(|(&lo, &e)| (lo, e)).collect())
            .collect();
        compact_dfa(&mut once);
        let twice: Vec<Vec<_>> = once
            .states
            .iter()
            .map(|s| s.edges.iter().map(|(&lo, &e)| (lo, e)).collect())
            .collect();
        assert_eq!(snapshot, twice, "pattern {rex:?}");
    }
}

#[test]
fn goto_targets_stay_in_bounds() {
    for rex in ["a|b", "a{2,3}", "(?i)AbC", "ab/cd", "[[:alpha:]_][[:alnum:]_]*"] {
        let code = compile(rex, "rl");
        for (lo, hi, target) in gotos(&code) {
            assert!(lo <= hi);
            assert!(target == IMAX || (target as usize) < code.len(), "pattern {rex:?}");
        }
    }
}

#[test]
fn encode_counts_match_emission() {
    // The debug assertion inside encode_dfa verifies the two-pass count;
    // exercising it across shapes here keeps it honest.
    for rex in ["a", "a*", "a{2,3}", "\\ba", "ab/cd", "(?^x)", "[^a]"] {
        let opt = Options::parse("rl");
        let parsed = Parser::new(rex.as_bytes(), opt).parse().unwrap();
        let rules = parsed.end.len();
        let opt = parsed.opt;
        let mut dfa = Builder::new(
            rex.as_bytes(),
            &opt,
            parsed.followpos,
            parsed.modifiers,
            parsed.lookahead,
            rules,
        )
        .build(parsed.startpos)
        .unwrap();
        compact_dfa(&mut dfa);
        let code = encode_dfa(&mut dfa, &opt, rex.as_bytes()).unwrap();
        assert!(!code.is_empty(), "pattern {rex:?}");
    }
}

#[test]
fn source_export_roundtrip() {
    let code = compile("(?i)[a-f]{2,4}x|y+", "r");
    let mut out = Vec::new();
    crate::export::write_code(&mut out, &code, "roundtrip").unwrap();
    let text = String::from_utf8(out).unwrap();
    let parsed: Vec<Opcode> = text
        .lines()
        .filter_map(|line| {
            let token = line.trim().strip_prefix("0x")?;
            Opcode::from_str_radix(token.split(',').next()?, 16).ok()
        })
        .collect();
    assert_eq!(parsed, code);
}

#[test]
fn graphviz_export_shape() {
    let dfa = build_dfa("a|b", "r");
    let mut out = Vec::new();
    crate::export::write_graphviz(&mut out, &dfa, "toy").unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("digraph toy {"));
    assert!(text.contains("init -> N0;"));
    // Two accepting states, doubled.
    assert_eq!(text.matches("peripheries=2").count(), 2);
    assert!(text.contains("N0 -> N1"));
    assert!(text.ends_with("}\n"));
}

#[test]
fn empty_pattern_matches_empty_input() {
    let code = compile("", "r");
    assert_eq!(run(&code, b""), Some((1, 0)));
    assert_eq!(run(&code, b"x"), Some((1, 0)));
}

#[test]
fn quoted_literal_matches_operators() {
    let code = compile("\"a|b\"", "rq");
    assert_eq!(run(&code, b"a|b"), Some((1, 3)));
    assert_eq!(run(&code, b"ab"), None);
}

#[test]
fn escaped_metachar_is_literal() {
    let code = compile("a\\*", "r");
    assert_eq!(run(&code, b"a*"), Some((1, 2)));
    assert_eq!(run(&code, b"aa"), None);
}

#[test]
fn negated_class_complements_bytes() {
    let code = compile("[^a]", "r");
    assert_eq!(run(&code, b"b"), Some((1, 1)));
    assert_eq!(run(&code, b"a"), None);
}
