//! Coverage of name-like tokens by references.
//!
//! A diagnostic used by tests and the `coverage` command: a name-like
//! token without a ref at its exact span is a missed ref, and a ref whose
//! span matches no token is invalid.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::model::{Ref, Tok};
use crate::span::Span;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Name-like tokens that should carry a ref.
    pub toks: usize,
    pub refs_matched: usize,
    pub exact_matched: usize,
    pub invalid: usize,
}

impl Stats {
    pub fn missed(&self) -> usize {
        self.toks.saturating_sub(self.refs_matched)
    }

    pub fn add(&mut self, other: Stats) {
        self.toks += other.toks;
        self.refs_matched += other.refs_matched;
        self.exact_matched += other.exact_matched;
        self.invalid += other.invalid;
    }
}

pub fn compute_coverage(toks: &[Tok], refs: &[Ref]) -> Stats {
    compute_coverage_excluding(toks, refs, &[])
}

/// Like [`compute_coverage`], but tokens at `excluded` spans (names
/// consumed by definitions) are not expected to carry a ref.
pub fn compute_coverage_excluding(toks: &[Tok], refs: &[Ref], excluded: &[Span]) -> Stats {
    let excluded: HashSet<(usize, usize)> = excluded.iter().map(|s| (s.start_byte, s.byte_len)).collect();
    let tok_spans: HashSet<(usize, usize)> = toks.iter().map(|t| (t.start_byte, t.byte_len)).collect();
    let ref_spans: HashMap<(usize, usize), bool> = refs
        .iter()
        .map(|r| {
            let exact = r.target.as_ref().is_some_and(|t| t.is_exact());
            ((r.span.start_byte, r.span.byte_len), exact)
        })
        .collect();

    let mut stats = Stats::default();
    for tok in toks.iter().filter(|t| t.kind.is_name_like()) {
        let key = (tok.start_byte, tok.byte_len);
        if excluded.contains(&key) {
            continue;
        }
        stats.toks += 1;
        if let Some(exact) = ref_spans.get(&key) {
            stats.refs_matched += 1;
            if *exact {
                stats.exact_matched += 1;
            }
        }
    }

    stats.invalid = refs
        .iter()
        .filter(|r| !tok_spans.contains(&(r.span.start_byte, r.span.byte_len)))
        .count();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Target, TokType};

    fn tok(start_byte: usize, byte_len: usize, kind: TokType) -> Tok {
        Tok {
            start_byte,
            byte_len,
            kind,
        }
    }

    fn reference(start_byte: usize, byte_len: usize, target: Option<Target>) -> Ref {
        Ref {
            span: Span::bytes(start_byte, byte_len),
            target,
        }
    }

    #[test]
    fn test_counts_matches() {
        let toks = vec![
            tok(0, 4, TokType::Keyword),
            tok(5, 1, TokType::Name),
            tok(7, 3, TokType::NameBuiltin),
            tok(11, 1, TokType::NameExportedMarker),
        ];
        let refs = vec![
            reference(5, 1, Some(Target::exact("a.go", Span::bytes(5, 1), None))),
            reference(7, 3, Some(Target::Builtin { id: "int".to_string() })),
        ];

        let stats = compute_coverage(&toks, &refs);
        assert_eq!(stats.toks, 3);
        assert_eq!(stats.refs_matched, 2);
        assert_eq!(stats.exact_matched, 1);
        assert_eq!(stats.missed(), 1);
        assert_eq!(stats.invalid, 0);
    }

    #[test]
    fn test_misaligned_ref_is_invalid() {
        let toks = vec![tok(0, 5, TokType::Name)];
        let refs = vec![reference(1, 3, None)];

        let stats = compute_coverage(&toks, &refs);
        assert_eq!(stats.invalid, 1);
        assert_eq!(stats.missed(), 1);
    }

    #[test]
    fn test_excluded_spans_not_expected() {
        let toks = vec![tok(0, 1, TokType::Name), tok(2, 1, TokType::Name)];
        let refs = vec![reference(2, 1, None)];

        let stats = compute_coverage_excluding(&toks, &refs, &[Span::bytes(0, 1)]);
        assert_eq!(stats.toks, 1);
        assert_eq!(stats.missed(), 0);
    }

    #[test]
    fn test_unresolved_ref_still_covers() {
        let toks = vec![tok(0, 1, TokType::Name)];
        let refs = vec![reference(0, 1, None)];

        let stats = compute_coverage(&toks, &refs);
        assert_eq!(stats.refs_matched, 1);
        assert_eq!(stats.exact_matched, 0);
    }
}
