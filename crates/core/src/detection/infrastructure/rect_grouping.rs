//! Merges overlapping cascade hits into final detections.
//!
//! A true face fires the cascade at several neighbouring positions and
//! scales; isolated hits are usually false positives. Grouping clusters
//! similar rectangles, averages each cluster and keeps clusters with more
//! than `min_neighbors` members.

use crate::detection::infrastructure::math;
use crate::shared::face_rect::FaceRect;

/// Relative tolerance for two hits to count as the same object.
pub const GROUP_EPS: f64 = 0.2;

/// Minimum neighbour count at which a cluster can suppress a nested one.
const STRONG_CLUSTER_NEIGHBORS: u32 = 3;

/// Groups candidate rectangles. With `min_neighbors == 0` hits are returned
/// ungrouped.
pub fn group_rectangles(candidates: &[FaceRect], min_neighbors: u32, eps: f64) -> Vec<FaceRect> {
    if min_neighbors == 0 || candidates.is_empty() {
        return candidates.to_vec();
    }

    let (labels, classes) = math::partition(candidates.len(), |i, j| {
        similar(&candidates[i], &candidates[j], eps)
    });

    let mut sums = vec![[0.0f64; 4]; classes];
    let mut counts = vec![0u32; classes];
    for (rect, &class) in candidates.iter().zip(&labels) {
        let sum = &mut sums[class];
        sum[0] += rect.x as f64;
        sum[1] += rect.y as f64;
        sum[2] += rect.width as f64;
        sum[3] += rect.height as f64;
        counts[class] += 1;
    }

    let averaged: Vec<FaceRect> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &n)| {
            let n = n as f64;
            FaceRect::new(
                (sum[0] / n).round() as u32,
                (sum[1] / n).round() as u32,
                (sum[2] / n).round() as u32,
                (sum[3] / n).round() as u32,
            )
        })
        .collect();

    let mut grouped = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let nested = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            j != i
                && n2 > min_neighbors
                && (n2 > STRONG_CLUSTER_NEIGHBORS.max(n1) || n1 < STRONG_CLUSTER_NEIGHBORS)
                && inside_with_margin(r1, r2, eps)
        });
        if !nested {
            grouped.push(*r1);
        }
    }
    grouped
}

/// Whether all four edges of `a` and `b` lie within a size-relative tolerance.
fn similar(a: &FaceRect, b: &FaceRect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.right(), b.right()) && close(a.bottom(), b.bottom())
}

/// Whether `inner` fits inside `outer` grown by `eps` of its size.
fn inside_with_margin(inner: &FaceRect, outer: &FaceRect, eps: f64) -> bool {
    let dx = (outer.width as f64 * eps).round() as i64;
    let dy = (outer.height as f64 * eps).round() as i64;
    inner.x as i64 >= outer.x as i64 - dx
        && inner.y as i64 >= outer.y as i64 - dy
        && inner.right() as i64 <= outer.right() as i64 + dx
        && inner.bottom() as i64 <= outer.bottom() as i64 + dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cluster_at(x: u32, y: u32, size: u32, count: u32) -> Vec<FaceRect> {
        (0..count).map(|i| FaceRect::new(x + i, y + i, size, size)).collect()
    }

    #[test]
    fn test_zero_neighbors_returns_raw_hits() {
        let hits = cluster_at(10, 10, 40, 3);
        assert_eq!(group_rectangles(&hits, 0, GROUP_EPS), hits);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_rectangles(&[], 3, GROUP_EPS).is_empty());
    }

    #[test]
    fn test_cluster_is_averaged() {
        // (10,10), (11,11), (12,12) -> mean (11,11)
        let hits = cluster_at(10, 10, 40, 3);
        assert_eq!(
            group_rectangles(&hits, 2, GROUP_EPS),
            vec![FaceRect::new(11, 11, 40, 40)]
        );
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 1)]
    #[case(3, 0)]
    #[case(4, 0)]
    fn test_cluster_needs_more_than_min_neighbors(#[case] min_neighbors: u32, #[case] expected: usize) {
        let hits = cluster_at(10, 10, 40, 3);
        assert_eq!(group_rectangles(&hits, min_neighbors, GROUP_EPS).len(), expected);
    }

    #[test]
    fn test_separate_clusters_stay_separate() {
        let mut hits = cluster_at(10, 10, 40, 3);
        hits.extend(cluster_at(200, 50, 60, 4));
        let grouped = group_rectangles(&hits, 2, GROUP_EPS);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[1], FaceRect::new(202, 52, 60, 60));
    }

    #[test]
    fn test_isolated_hit_is_dropped() {
        let mut hits = cluster_at(10, 10, 40, 3);
        hits.push(FaceRect::new(300, 300, 40, 40));
        let grouped = group_rectangles(&hits, 1, GROUP_EPS);
        assert_eq!(grouped, vec![FaceRect::new(11, 11, 40, 40)]);
    }

    #[test]
    fn test_weak_nested_cluster_is_suppressed() {
        // Strong face at (100,100) 80x80 with 6 hits; weak 2-hit cluster
        // inside it at (120,120) 30x30.
        let mut hits = cluster_at(100, 100, 80, 6);
        hits.extend(cluster_at(120, 120, 30, 2));
        let grouped = group_rectangles(&hits, 1, GROUP_EPS);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].width, 80);
    }

    #[test]
    fn test_similarity_tolerance_scales_with_size() {
        let a = FaceRect::new(0, 0, 100, 100);
        // delta = 0.2 * (100 + 100) / 2 = 20
        assert!(similar(&a, &FaceRect::new(20, 0, 100, 100), GROUP_EPS));
        assert!(!similar(&a, &FaceRect::new(21, 0, 100, 100), GROUP_EPS));
    }
}
