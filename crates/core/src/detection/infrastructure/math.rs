//! Shared math utilities for detection infrastructure.
//!
//! Union-find partitioning for candidate grouping and corner-form IoU for
//! non-max suppression.

/// IoU between two bounding boxes represented as `[x1, y1, x2, y2]`.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

/// Find root of element `i` with path halving for amortized near-O(1).
pub fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Merge the sets containing `a` and `b`.
pub fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

/// Label each of `n` elements with a dense class index, merging every pair
/// for which `same_class` holds. Classes are numbered by first appearance.
pub fn partition(n: usize, mut same_class: impl FnMut(usize, usize) -> bool) -> (Vec<usize>, usize) {
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if same_class(i, j) {
                union(&mut parent, i, j);
            }
        }
    }

    let mut class_of_root = std::collections::HashMap::new();
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let root = find(&mut parent, i);
        let next = class_of_root.len();
        labels.push(*class_of_root.entry(root).or_insert(next));
    }
    let classes = class_of_root.len();
    (labels, classes)
}
