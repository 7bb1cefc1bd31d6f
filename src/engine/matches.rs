//! Match-region reconstruction
//!
//! Shared token hashes ground candidate span pairs; candidates are
//! merged greedily left-to-right on file A with a bounded line gap,
//! subject to the B-ranges advancing monotonically. Groups backed by
//! too few distinct hashes are dropped, and the surviving A-ranges are
//! made disjoint (earlier group wins, later group loses its overlap).

use crate::config::EngineConfig;
use crate::fingerprint::{LineSpan, TokenFingerprint};
use crate::pair::Match;
use std::collections::HashSet;

struct Group {
    a: LineSpan,
    b: LineSpan,
    hashes: HashSet<u64>,
}

/// Reconstruct the ordered, disjoint match list for one pair.
pub fn reconstruct(
    a: &TokenFingerprint,
    b: &TokenFingerprint,
    config: &EngineConfig,
) -> Vec<Match> {
    let mut candidates: Vec<(LineSpan, LineSpan, u64)> = Vec::new();
    for hash in a.shared_hashes(b) {
        for span_a in &a.positions[&hash] {
            for span_b in &b.positions[&hash] {
                candidates.push((*span_a, *span_b, hash));
            }
        }
    }
    candidates.sort_by_key(|(sa, sb, _)| {
        (sa.start_line, sa.end_line, sb.start_line, sb.end_line)
    });

    let gap = config.gap;
    let mut groups: Vec<Group> = Vec::new();
    for (span_a, span_b, hash) in candidates {
        if let Some(group) = groups.last_mut() {
            let a_adjacent = span_a.start_line <= group.a.end_line + gap;
            let b_adjacent = span_b.start_line <= group.b.end_line + gap;
            let b_regressed = span_b.start_line < group.b.end_line.saturating_sub(gap);
            if a_adjacent && b_adjacent && !b_regressed {
                group.a.end_line = group.a.end_line.max(span_a.end_line);
                group.b.start_line = group.b.start_line.min(span_b.start_line);
                group.b.end_line = group.b.end_line.max(span_b.end_line);
                group.hashes.insert(hash);
                continue;
            }
        }
        groups.push(Group {
            a: span_a,
            b: span_b,
            hashes: [hash].into_iter().collect(),
        });
    }

    groups.retain(|g| g.hashes.len() >= config.min_match_kgrams);

    // Post-condition: A-ranges disjoint, sorted ascending. The earlier
    // group wins; the later one is trimmed and dropped when nothing is
    // left.
    let mut matches: Vec<Match> = Vec::new();
    for group in groups {
        let mut m = Match {
            a_start: group.a.start_line,
            a_end: group.a.end_line,
            b_start: group.b.start_line,
            b_end: group.b.end_line,
        };
        if let Some(prev) = matches.last() {
            if m.a_start <= prev.a_end {
                if m.a_end <= prev.a_end {
                    continue;
                }
                m.a_start = prev.a_end + 1;
            }
        }
        matches.push(m);
    }
    matches
}
