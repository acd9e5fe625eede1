/// Longest-common-subsequence edit script, grouped into change regions.
///
/// Uses Myers' O((N+M)·D) shortest-edit-script search after trimming the
/// common prefix and suffix. If the edit distance exceeds
/// [`MAX_EDIT_DISTANCE`] the untrimmed middle is reported as one region:
/// still a correct script, just not a minimal one.
pub const MAX_EDIT_DISTANCE: usize = 2048;

/// One contiguous change: `removed` replaces `old[old_start..]` and `added`
/// appears at `new[new_start..]`. Indices are 0-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region<T> {
    pub old_start: usize,
    pub removed: Vec<T>,
    pub new_start: usize,
    pub added: Vec<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Delete,
    Insert,
}

/// Compute the change regions that turn `old` into `new`, in file order.
pub fn diff<T: PartialEq + Clone>(old: &[T], new: &[T]) -> Vec<Region<T>> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let script = match shortest_edit_script(a, b) {
        Some(script) => script,
        None => {
            let mut script = vec![Edit::Delete; a.len()];
            script.extend(std::iter::repeat(Edit::Insert).take(b.len()));
            script
        }
    };

    group_regions(&script, a, b, prefix)
}

fn group_regions<T: Clone>(script: &[Edit], a: &[T], b: &[T], base: usize) -> Vec<Region<T>> {
    let mut regions = Vec::new();
    let mut current: Option<Region<T>> = None;
    let (mut x, mut y) = (0usize, 0usize);

    for edit in script {
        match edit {
            Edit::Keep => {
                if let Some(region) = current.take() {
                    regions.push(region);
                }
                x += 1;
                y += 1;
            }
            Edit::Delete | Edit::Insert => {
                let region = current.get_or_insert_with(|| Region {
                    old_start: base + x,
                    removed: Vec::new(),
                    new_start: base + y,
                    added: Vec::new(),
                });
                if *edit == Edit::Delete {
                    region.removed.push(a[x].clone());
                    x += 1;
                } else {
                    region.added.push(b[y].clone());
                    y += 1;
                }
            }
        }
    }
    if let Some(region) = current {
        regions.push(region);
    }
    regions
}

/// Myers' greedy forward search, keeping one snapshot of the furthest-reaching
/// diagonals per edit distance so the path can be traced back.
fn shortest_edit_script<T: PartialEq>(a: &[T], b: &[T]) -> Option<Vec<Edit>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 && m == 0 {
        return Some(Vec::new());
    }

    let max = (n + m) as usize;
    let limit = max.min(MAX_EDIT_DISTANCE);
    let offset = max as isize + 1;
    let mut v = vec![0isize; 2 * max + 3];
    // trace[d][k + d] is the furthest x on diagonal k after d edits.
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let mut found = None;
    'search: for d in 0..=limit as isize {
        for k in (-d..=d).step_by(2) {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                trace.push(snapshot(&v, d, offset));
                found = Some(d);
                break 'search;
            }
        }
        trace.push(snapshot(&v, d, offset));
    }
    let depth = found?;

    let mut script = Vec::with_capacity(max);
    let (mut x, mut y) = (n, m);
    for d in (1..=depth).rev() {
        let prev = &trace[(d - 1) as usize];
        let at = |k: isize| prev[(k + d - 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;
        while x > prev_x && y > prev_y {
            script.push(Edit::Keep);
            x -= 1;
            y -= 1;
        }
        script.push(if x == prev_x { Edit::Insert } else { Edit::Delete });
        x = prev_x;
        y = prev_y;
    }
    while x > 0 && y > 0 {
        script.push(Edit::Keep);
        x -= 1;
        y -= 1;
    }
    script.reverse();
    Some(script)
}

fn snapshot(v: &[isize], d: isize, offset: isize) -> Vec<isize> {
    let lo = (offset - d) as usize;
    let hi = (offset + d) as usize;
    v[lo..=hi].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply<T: Clone>(old: &[T], regions: &[Region<T>]) -> Vec<T> {
        let mut out = Vec::new();
        let mut pos = 0;
        for r in regions {
            out.extend_from_slice(&old[pos..r.old_start]);
            out.extend(r.added.iter().cloned());
            pos = r.old_start + r.removed.len();
        }
        out.extend_from_slice(&old[pos..]);
        out
    }

    #[test]
    fn test_identical() {
        let a = vec!["a", "b", "c"];
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn test_single_replacement() {
        let old = vec!["a", "b", "c"];
        let new = vec!["a", "X", "c"];
        let regions = diff(&old, &new);
        assert_eq!(
            regions,
            vec![Region {
                old_start: 1,
                removed: vec!["b"],
                new_start: 1,
                added: vec!["X"],
            }]
        );
    }

    #[test]
    fn test_separate_regions() {
        let old: Vec<char> = "abcdefgh".chars().collect();
        let new: Vec<char> = "aXcdeYYgh".chars().collect();
        let regions = diff(&old, &new);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].old_start, 1);
        assert_eq!(regions[1].old_start, 5);
        assert_eq!(regions[1].new_start, 5);
        assert_eq!(apply(&old, &regions), new);
    }

    #[test]
    fn test_all_insert_and_all_delete() {
        let old: Vec<u8> = vec![];
        let new = vec![1u8, 2, 3];
        let regions = diff(&old, &new);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].added, new);
        assert!(regions[0].removed.is_empty());

        let regions = diff(&new, &old);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].removed, new);
    }

    #[test]
    fn test_minimal_script() {
        let old: Vec<char> = "ABCABBA".chars().collect();
        let new: Vec<char> = "CBABAC".chars().collect();
        let regions = diff(&old, &new);
        let edits: usize = regions
            .iter()
            .map(|r| r.removed.len() + r.added.len())
            .sum();
        // LCS of the classic Myers example has length 4.
        assert_eq!(edits, 5);
        assert_eq!(apply(&old, &regions), new);
    }

    #[test]
    fn test_distance_limit_falls_back_to_single_region() {
        let old: Vec<u32> = (0..3000).collect();
        let new: Vec<u32> = (10_000..13_000).collect();
        let regions = diff(&old, &new);
        assert_eq!(regions.len(), 1);
        assert_eq!(apply(&old, &regions), new);
    }
}
