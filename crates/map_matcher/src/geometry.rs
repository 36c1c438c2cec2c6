//! Point-to-segment projection.

use contracts::Point;

/// Projection of a point onto a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// 投影点
    pub point: Point,
    /// 参数位置，已截断到 [0, 1]
    pub t: f64,
    /// 原点到投影点的距离
    pub distance: f64,
}

/// Project `p` onto segment `start -> end`
///
/// A degenerate segment (start == end) projects onto its start point.
pub fn project_onto_segment(p: Point, start: Point, end: Point) -> Projection {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len_sq = dx * dx + dy * dy;

    if len_sq == 0.0 {
        return Projection {
            point: start,
            t: 0.0,
            distance: p.distance_to(&start),
        };
    }

    let t = (((p.x - start.x) * dx + (p.y - start.y) * dy) / len_sq).clamp(0.0, 1.0);
    let point = Point::new(start.x + t * dx, start.y + t * dy);
    Projection {
        point,
        t,
        distance: p.distance_to(&point),
    }
}

/// Closest projection over consecutive pairs of a polyline
pub fn project_onto_polyline<I>(p: Point, vertices: I) -> Option<Projection>
where
    I: IntoIterator<Item = Point>,
{
    let mut iter = vertices.into_iter();
    let mut prev = iter.next()?;
    let mut best: Option<Projection> = None;

    for next in iter {
        let candidate = project_onto_segment(p, prev, next);
        if best.map_or(true, |b| candidate.distance < b.distance) {
            best = Some(candidate);
        }
        prev = next;
    }
    best
}
