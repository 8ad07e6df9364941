/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Linear scoring primitive shared by every scorer.
//!
//! Callers decide *what* makes a server desirable; this module only turns
//! an ordering into score increments.  With `g` distinct tie groups, the
//! group at dense rank `r` (0 = most favoured) receives
//!
//! ```text
//! budget × (1 − r / (g − 1))        (g == 1 → the full budget)
//! ```
//!
//! so the best group gets the whole budget, the worst gets nothing, and
//! equal keys always get equal increments.

use std::cmp::Ordering;

use super::Reasons;
use crate::server::Server;

/// Add linearly interpolated increments of `budget` to `servers`.
///
/// `ordered` lists `(index into servers, tie key)` from most to least
/// favoured.  Each touched server's reason is extended with
/// `+X.XX score due to <criterion>`.
pub fn linear<K: PartialEq>(
    servers: &mut [Server],
    ordered: &[(usize, K)],
    budget: f64,
    criterion: &str,
    reasons: &mut Reasons,
) {
    let budget = budget.max(0.0);
    let groups = 1 + ordered.windows(2).filter(|w| w[0].1 != w[1].1).count();

    let mut rank = 0usize;
    for (pos, (idx, key)) in ordered.iter().enumerate() {
        if pos > 0 && ordered[pos - 1].1 != *key {
            rank += 1;
        }
        let delta = if groups <= 1 {
            budget
        } else {
            budget * (1.0 - rank as f64 / (groups - 1) as f64)
        };

        let server = &mut servers[*idx];
        server.add_score(delta);
        reasons.append(&server.uuid, format!("+{:.2} score due to {}", delta, criterion));
    }
}

/// Rank `servers` by `key` and score them with budget `|weight|`.
///
/// A positive weight favours *smaller* keys, a negative weight larger ones.
/// Equal keys keep their input order.  Servers are scored in place; their
/// order in `servers` is left untouched.
pub fn score_weighted<F>(
    servers: &mut [Server],
    weight: f64,
    criterion: &str,
    reasons: &mut Reasons,
    key: F,
) where
    F: Fn(&Server) -> f64,
{
    let mut ordered: Vec<(usize, f64)> = servers
        .iter()
        .enumerate()
        .map(|(i, s)| (i, key(s)))
        .collect();

    ordered.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        if weight < 0.0 {
            ord.reverse()
        } else {
            ord
        }
    });

    linear(servers, &ordered, weight.abs(), criterion, reasons);
}

// ── Tests ─────────────────────────────────────────────────────────────────────
