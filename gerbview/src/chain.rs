//! Fragment chaining - join stroke centerlines into closed loops.
//!
//! A stroked board outline arrives as a pile of open path fragments in
//! whatever order and direction the CAD tool wrote them. This module
//! walks them greedily: always take the unplaced fragment with an endpoint
//! nearest the chain's current end, flipping it when its end is the near
//! side, and close the loop once the chain comes back around.

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::geometry::{Path, Point};
use crate::path_ops::{endpoints, reverse_path};

/// Configuration for fragment chaining.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Maximum gap between endpoints that still counts as connected.
    /// The outline builder uses half the estimated stroke width.
    pub tolerance: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self { tolerance: 0.1 }
    }
}

impl ChainConfig {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

/// An open fragment with its endpoints resolved once up front.
struct Fragment<'a> {
    path: &'a Path,
    begin: Point,
    end: Point,
}

/// Chain fragments into one path of (ideally) closed loops.
///
/// # Algorithm
///
/// 1. Seed the chain with the first fragment
/// 2. Pick the remaining fragment whose begin, else end, is nearest the
///    chain's trailing endpoint; reverse it if the end was nearer
/// 3. Append it, joining into the same subpath when the gap is within
///    tolerance
/// 4. When the trailing end comes back within tolerance of the loop's
///    first point, close the loop and seed a new one
///
/// # Performance
///
/// O(n²): every placement scans all remaining fragments. Board outlines
/// have tens of fragments, not thousands.
pub fn chain_fragments(fragments: &[Path], config: &ChainConfig, cancel: &CancelToken) -> Result<(Path, ChainStats)> {
    let mut remaining: Vec<Fragment> = fragments
        .iter()
        .filter_map(|path| endpoints(path).map(|(begin, end)| Fragment { path, begin, end }))
        .collect();

    let mut stats = ChainStats { input_fragments: remaining.len(), ..ChainStats::default() };
    let mut chain = Path::new();
    if remaining.is_empty() {
        return Ok((chain, stats));
    }

    let tolerance = config.tolerance;
    let first = remaining.remove(0);
    chain.append(first.path, false);
    let mut loop_begin = first.begin;
    let mut last_end = first.end;

    while !remaining.is_empty() {
        cancel.check()?;

        let (index, flip, distance) = nearest_fragment(&remaining, last_end);
        let fragment = remaining.remove(index);

        let connect = distance < tolerance;
        if flip {
            chain.append(&reverse_path(fragment.path)?, connect);
            last_end = fragment.begin;
            stats.reversed += 1;
        } else {
            chain.append(fragment.path, connect);
            last_end = fragment.end;
        }
        if connect {
            stats.joined += 1;
        }

        if last_end.distance(loop_begin) < tolerance {
            chain.close();
            stats.closed_loops += 1;

            if !remaining.is_empty() {
                let seed = remaining.remove(0);
                chain.append(seed.path, false);
                loop_begin = seed.begin;
                last_end = seed.end;
            }
        }
    }

    Ok((chain, stats))
}

/// Index of the nearest fragment to `target`, whether it must be flipped,
/// and the gap. Begins are scanned before ends, first strict minimum wins.
fn nearest_fragment(fragments: &[Fragment], target: Point) -> (usize, bool, f64) {
    let mut best = (0, false, f64::INFINITY);

    for (i, f) in fragments.iter().enumerate() {
        let d = f.begin.distance(target);
        if d < best.2 {
            best = (i, false, d);
        }
    }
    for (i, f) in fragments.iter().enumerate() {
        let d = f.end.distance(target);
        if d < best.2 {
            best = (i, true, d);
        }
    }

    best
}

/// What the chainer did, for logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainStats {
    /// Fragments with at least one point
    pub input_fragments: usize,
    /// Fragments that had to be flipped
    pub reversed: usize,
    /// Appends that merged into the current subpath
    pub joined: usize,
    /// Loops closed within tolerance
    pub closed_loops: usize,
}

// ============================================================================
// TESTS
// ============================================================================
