//! Reordering patches while preserving their combined effect.
//!
//! `commute(a, b)` takes `a` applied before `b` and returns `(b', a')`
//! such that applying `b'` then `a'` does the same thing. It fails with a
//! [`CommuteConflict`] whenever the two changes depend on each other's order.

use crate::error::CommuteConflict;
use crate::primitive::{Positional, PrimitivePatch};

type Pair = (PrimitivePatch, PrimitivePatch);

impl PrimitivePatch {
    /// Commute `self` (applied first) with `other` (applied second).
    pub fn commute(&self, other: &PrimitivePatch) -> Result<Pair, CommuteConflict> {
        use PrimitivePatch::*;

        let swapped = || Ok((other.clone(), self.clone()));
        let conflict = |message: &str| {
            tracing::debug!(
                first = self.token(),
                second = other.token(),
                path = self.path(),
                reason = message,
                "commute conflict"
            );
            Err(CommuteConflict::new(message))
        };

        match (self, other) {
            (AddFile(p), AddFile(q)) if p.path() == q.path() => {
                conflict("cannot create two files with the same path")
            }
            (AddFile(p), RmFile(q)) if p.path() == q.path() => {
                conflict("file would be removed before it is created")
            }
            (AddFile(p), Move(m)) if m.original_path() == p.path() || m.new_path() == p.path() => {
                conflict("file would be moved before it is created")
            }
            (AddFile(p), Hunk(_) | Binary(_)) if p.path() == other.path() => {
                conflict("file would be edited before it is created")
            }

            (RmFile(p), AddFile(q)) if p.path() == q.path() => {
                conflict("reordering remove and add yields two files with the same path")
            }
            (RmFile(p), RmFile(q)) if p.path() == q.path() => {
                conflict("cannot remove the same file twice")
            }
            (RmFile(p), Move(m)) if m.original_path() == p.path() || m.new_path() == p.path() => {
                conflict("remove and move of the same file are order-dependent")
            }
            (RmFile(p), Hunk(_) | Binary(_)) if p.path() == other.path() => {
                conflict("file would be edited after it is removed")
            }

            (Move(m), AddFile(q)) if q.path() == m.original_path() || q.path() == m.new_path() => {
                conflict("move and add are order-dependent")
            }
            (Move(m), RmFile(q)) if q.path() == m.original_path() || q.path() == m.new_path() => {
                conflict("move and remove are order-dependent")
            }
            (Move(m), Move(n)) => {
                if n.original_path() == m.new_path() || n.original_path() == m.original_path() {
                    conflict("cannot commute moves that affect the same file")
                } else if n.new_path() == m.original_path() {
                    conflict("reordering these moves yields two files with the same path")
                } else if n.new_path() == m.new_path() {
                    conflict("both moves target the same path")
                } else {
                    swapped()
                }
            }
            (Move(m), Hunk(h)) if h.path() == m.new_path() => {
                Ok((Hunk(h.with_path(m.original_path())), self.clone()))
            }
            (Move(m), Binary(b)) if b.path() == m.new_path() => {
                Ok((Binary(b.with_path(m.original_path())), self.clone()))
            }
            (Move(m), Hunk(_) | Binary(_)) if other.path() == m.original_path() => {
                conflict("file would be edited at its old path after it is moved")
            }

            (Hunk(_) | Binary(_), AddFile(q)) if q.path() == self.path() => {
                conflict("file would be created after it is edited")
            }
            (Hunk(_) | Binary(_), RmFile(q)) if q.path() == self.path() => {
                conflict("cannot modify a file after it is removed")
            }
            (Hunk(h), Move(m)) if h.path() == m.original_path() => {
                Ok((other.clone(), Hunk(h.with_path(m.new_path()))))
            }
            (Binary(b), Move(m)) if b.path() == m.original_path() => {
                Ok((other.clone(), Binary(b.with_path(m.new_path()))))
            }
            (Hunk(_) | Binary(_), Move(m)) if self.path() == m.new_path() => {
                conflict("file would be replaced by a move after it is edited")
            }
            (Hunk(a), Hunk(b)) if a.path() == b.path() => {
                let (b, a) = commute_positional(a, b)?;
                Ok((Hunk(b), Hunk(a)))
            }
            (Binary(a), Binary(b)) if a.path() == b.path() => {
                let (b, a) = commute_positional(a, b)?;
                Ok((Binary(b), Binary(a)))
            }
            (Hunk(_), Binary(_)) | (Binary(_), Hunk(_)) if self.path() == other.path() => {
                conflict("text and binary edits of the same file are order-dependent")
            }

            _ => swapped(),
        }
    }
}

/// Commute two edits of the same file by their anchors and lengths.
/// Anchors too large to shift are reported as a conflict.
fn commute_positional<P: Positional>(first: &P, second: &P) -> Result<(P, P), CommuteConflict> {
    let (l1, o1, n1) = (first.anchor(), first.old_len(), first.new_len());
    let (l2, o2, n2) = (second.anchor(), second.old_len(), second.new_len());
    let all_nonempty = o1 != 0 && n1 != 0 && o2 != 0 && n2 != 0;

    let out_of_range = || CommuteConflict::new("patch anchor out of range");
    let shift = |anchor: usize, sub: usize, add: usize| {
        anchor
            .checked_sub(sub)
            .and_then(|a| a.checked_add(add))
            .ok_or_else(out_of_range)
    };
    let first_end = l1.checked_add(n1).ok_or_else(out_of_range)?;
    let second_end = l2.checked_add(o2).ok_or_else(out_of_range)?;

    if first_end < l2 {
        // first lies wholly before second
        Ok((second.with_anchor(shift(l2, n1, o1)?), first.clone()))
    } else if second_end < l1 {
        // second lies wholly before first
        Ok((second.clone(), first.with_anchor(shift(l1, o2, n2)?)))
    } else if second_end == l1 && all_nonempty {
        Ok((second.clone(), first.with_anchor(shift(l1, o2, n2)?)))
    } else if first_end == l2 && all_nonempty {
        Ok((second.with_anchor(shift(l2, n1, o1)?), first.clone()))
    } else {
        Err(CommuteConflict::new("patches overlap"))
    }
}

/// Commute two sequences: `a` applied before `b` becomes `b'` before `a'`.
///
/// Every element of `a`, last first, is bubbled rightwards across `b` one
/// adjacent swap at a time. The first failing swap aborts the whole commute.
pub fn commute_sequences(
    a: &[PrimitivePatch],
    b: &[PrimitivePatch],
) -> Result<(Vec<PrimitivePatch>, Vec<PrimitivePatch>), CommuteConflict> {
    if a.is_empty() || b.is_empty() {
        return Ok((b.to_vec(), a.to_vec()));
    }

    let mut patches: Vec<PrimitivePatch> = a.iter().chain(b.iter()).cloned().collect();
    let mut right_bound = patches.len() - 1;
    for left_bound in (0..a.len()).rev() {
        for left in left_bound..right_bound {
            let (later, earlier) = patches[left].commute(&patches[left + 1])?;
            patches[left] = later;
            patches[left + 1] = earlier;
        }
        right_bound -= 1;
    }

    let second = patches.split_off(b.len());
    Ok((patches, second))
}

/// Inverse of a sequence: each patch inverted, in reverse order.
pub fn invert_sequence(patches: &[PrimitivePatch]) -> Vec<PrimitivePatch> {
    patches.iter().rev().map(PrimitivePatch::inverse).collect()
}

/// Rebase `b` so that it applies after `a`.
///
/// Both sequences must start from the same file state; the engine cannot
/// check that, so a mismatched pair surfaces later as an apply failure.
pub fn merge_sequences(
    a: &[PrimitivePatch],
    b: &[PrimitivePatch],
) -> Result<Vec<PrimitivePatch>, CommuteConflict> {
    if a.is_empty() || b.is_empty() {
        return Ok(b.to_vec());
    }
    let (rebased, _) = commute_sequences(&invert_sequence(a), b)?;
    Ok(rebased)
}
