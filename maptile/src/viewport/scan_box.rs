//! Scan-line fill of the projected screen box over a tile grid.
//!
//! The screen rectangle (possibly rotated) is mapped into tile units of the
//! requested zoom level, split into two triangles and rasterized row by row.
//! Each covered row is reported as a half-open column span. Rows are clipped
//! to the grid; columns are not, so callers see spans reaching past the
//! antimeridian and decide how to wrap them.

use super::DEFAULT_TILE_SIZE;

#[derive(Debug, Clone, Copy, Default)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    dx: f64,
    dy: f64,
}

impl Edge {
    /// Edge oriented so that `y0 <= y1`.
    fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (x0, y0, x1, y1) = if y0 <= y1 {
            (x0, y0, x1, y1)
        } else {
            (x1, y1, x0, y0)
        };
        Self {
            x0,
            y0,
            x1,
            y1,
            dx: x1 - x0,
            dy: y1 - y0,
        }
    }
}

/// Rasterizes a screen quad into tile rows.
#[derive(Debug, Clone, Copy)]
pub struct ScanBox {
    tile_size: f64,
}

impl Default for ScanBox {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE)
    }
}

/// Per-scan state: grid size and the horizontal clip range.
struct Span {
    rows: i64,
    xmin: i64,
    xmax: i64,
}

impl ScanBox {
    pub fn new(tile_size: u32) -> Self {
        Self {
            tile_size: tile_size.max(1) as f64,
        }
    }

    /// Reports every tile row intersecting `quad` at `zoom`.
    ///
    /// `x`, `y` and `scale` are the viewport centre and scale, `quad` the
    /// corner offsets from [`super::Viewport::map_extents`]. The callback
    /// receives `(row, first_column, end_column)`; the same row may be
    /// reported more than once with overlapping spans.
    pub fn scan<F>(&self, x: f64, y: f64, scale: f64, zoom: u8, quad: &[f64; 8], mut visible: F)
    where
        F: FnMut(i64, i64, i64),
    {
        let scaled = scale * self.tile_size;
        let div = scaled / (1u64 << zoom) as f64;
        let cx = x * scaled;
        let cy = y * scaled;

        let mut b = [0.0f64; 8];
        for i in (0..8).step_by(2) {
            b[i] = (cx + quad[i]) / div;
            b[i + 1] = (cy + quad[i + 1]) / div;
        }

        // steep angles overshoot in x, clip spans to the box extent
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for i in (0..8).step_by(2) {
            min = min.min(b[i]);
            max = max.max(b[i]);
        }
        let min = min.floor();
        let mut max = max.ceil();
        if min == max {
            max += 1.0;
        }

        let span = Span {
            rows: 1i64 << zoom,
            xmin: min as i64,
            xmax: max as i64,
        };

        Self::scan_triangle(
            &span,
            Edge::new(b[0], b[1], b[2], b[3]),
            Edge::new(b[2], b[3], b[4], b[5]),
            Edge::new(b[4], b[5], b[0], b[1]),
            &mut visible,
        );
        Self::scan_triangle(
            &span,
            Edge::new(b[0], b[1], b[4], b[5]),
            Edge::new(b[4], b[5], b[6], b[7]),
            Edge::new(b[6], b[7], b[0], b[1]),
            &mut visible,
        );
    }

    fn scan_triangle<F>(span: &Span, mut ab: Edge, mut bc: Edge, mut ca: Edge, visible: &mut F)
    where
        F: FnMut(i64, i64, i64),
    {
        // order so that ca.dy >= bc.dy >= ab.dy
        if ab.dy > bc.dy {
            std::mem::swap(&mut ab, &mut bc);
        }
        if ab.dy > ca.dy {
            std::mem::swap(&mut ab, &mut ca);
        }
        if bc.dy > ca.dy {
            std::mem::swap(&mut bc, &mut ca);
        }

        if ca.dy == 0.0 {
            return;
        }
        if ab.dy > 0.0 {
            Self::scan_spans(span, ca, ab, visible);
        }
        if bc.dy > 0.0 {
            Self::scan_spans(span, ca, bc, visible);
        }
    }

    fn scan_spans<F>(span: &Span, mut e0: Edge, mut e1: Edge, visible: &mut F)
    where
        F: FnMut(i64, i64, i64),
    {
        // rows covered by the shorter edge
        let y0 = (e1.y0.floor() as i64).max(0);
        let y1 = (e1.y1.ceil() as i64).min(span.rows);

        // e0 must be the right-hand edge
        let swap = if e0.x0 == e1.x0 && e0.y0 == e1.y0 {
            e0.x0 + e1.dy / e0.dy * e0.dx < e1.x1
        } else {
            e0.x1 - e1.dy / e0.dy * e0.dx < e1.x0
        };
        if swap {
            std::mem::swap(&mut e0, &mut e1);
        }

        let m0 = e0.dx / e0.dy;
        let m1 = e1.dx / e1.dy;

        // sample the row edge that lies further out
        let d0 = if e0.dx > 0.0 { 1.0 } else { 0.0 };
        let d1 = if e1.dx < 0.0 { 1.0 } else { 0.0 };

        for y in y0..y1 {
            let dy = (d0 + y as f64 - e0.y0).min(e0.dy);
            let mut x_end = (e0.x0 + m0 * dy).ceil() as i64;

            let dy = (d1 + y as f64 - e1.y0).min(e1.dy);
            let mut x_start = (e1.x0 + m1 * dy).floor() as i64;

            if x_start < span.xmin {
                x_start = span.xmin;
            }
            if x_end > span.xmax {
                x_end = span.xmax;
            }
            if x_start < x_end {
                visible(y, x_start, x_end);
            }
        }
    }
}
