// SPDX-License-Identifier: LGPL-3.0-or-later OR MPL-2.0
// This file is a part of `undercoat`.
//
// `undercoat` is free software: you can redistribute it and/or modify it under the
// terms of either:
//
// * GNU Lesser General Public License as published by the Free Software Foundation, either
//   version 3 of the License, or (at your option) any later version.
// * Mozilla Public License as published by the Mozilla Foundation, version 2.
//
// `undercoat` is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR
// PURPOSE. See the GNU Lesser General Public License or the Mozilla Public License for more
// details.
//
// You should have received a copy of the GNU Lesser General Public License and the Mozilla
// Public License along with `undercoat`. If not, see <https://www.gnu.org/licenses/>.

//! Transform and device-pixel helpers shared by the painting primitives.

use piet::kurbo::{Affine, BezPath, Point, Rect, Size};

/// The rect used where the platform would use an unbounded clip region.
///
/// Kept finite so that even-odd clip paths built from it stay well formed.
pub const INFINITE_RECT: Rect = Rect::new(-8.0e15, -8.0e15, 8.0e15, 8.0e15);

/// Cubic bezier circle approximation constant.
const KAPPA: f64 = 0.552_284_749_830_793_4;

/// Relative comparison with the tolerance the painting heuristics use.
pub(crate) fn essentially_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1.0e-6 * a.abs().max(b.abs())
}

pub(crate) fn rect_is_empty(rect: Rect) -> bool {
    rect.width() <= 0.0 || rect.height() <= 0.0
}

pub(crate) fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

pub(crate) fn rect_contains_rect(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

pub(crate) fn transposed_size(size: Size) -> Size {
    Size::new(size.height, size.width)
}

pub(crate) fn transposed_rect(rect: Rect) -> Rect {
    Rect::from_origin_size((rect.x0, rect.y0), transposed_size(rect.size()))
}

/// Maps a size through the linear part of a transform.
pub(crate) fn map_size(transform: Affine, size: Size) -> Size {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    Size::new(a * size.width + c * size.height, b * size.width + d * size.height)
}

pub(crate) fn x_scale(transform: Affine) -> f64 {
    let [a, b, ..] = transform.as_coeffs();
    (a * a + b * b).sqrt()
}

pub(crate) fn y_scale(transform: Affine) -> f64 {
    let [_, _, c, d, _, _] = transform.as_coeffs();
    (c * c + d * d).sqrt()
}

/// True if the transform has a rotation or shear component.
pub(crate) fn is_rotate_or_shear(transform: Affine) -> bool {
    let [_, b, c, _, _, _] = transform.as_coeffs();
    b != 0.0 || c != 0.0
}

pub(crate) fn is_identity(transform: Affine) -> bool {
    transform.as_coeffs() == Affine::IDENTITY.as_coeffs()
}

/// Rounds a rect to device pixels under a non-identity user-to-device matrix:
/// the rect is mapped to device space, rounded there, and mapped back.
pub(crate) fn round_to_device_pixels_non_identity(device_matrix: Affine, rect: Rect) -> Rect {
    let device_rect = device_matrix.transform_rect_bbox(rect).round();
    device_matrix.inverse().transform_rect_bbox(device_rect)
}

/// A rectangle with per-corner elliptical radii.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoundedRect {
    pub rect: Rect,
    pub radii: CornerRadii,
}

impl RoundedRect {
    pub fn new(rect: Rect, radii: CornerRadii) -> Self {
        Self { rect, radii }
    }

    /// A rounded rect whose four corners share one radius.
    pub fn uniform(rect: Rect, radius: Size) -> Self {
        Self { rect, radii: CornerRadii::uniform(radius) }
    }
}

/// Per-corner radii of a [`RoundedRect`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CornerRadii {
    pub top_left: Size,
    pub top_right: Size,
    pub bottom_left: Size,
    pub bottom_right: Size,
}

impl CornerRadii {
    pub fn uniform(radius: Size) -> Self {
        Self {
            top_left: radius,
            top_right: radius,
            bottom_left: radius,
            bottom_right: radius,
        }
    }

    pub fn is_zero(&self) -> bool {
        let zero = |s: Size| s.width == 0.0 && s.height == 0.0;
        zero(self.top_left) && zero(self.top_right) && zero(self.bottom_left) && zero(self.bottom_right)
    }

    /// True if all four corners share one width and one height.
    pub fn is_uniform(&self) -> bool {
        let widths_equal = self.top_left.width == self.top_right.width
            && self.top_right.width == self.bottom_left.width
            && self.bottom_left.width == self.bottom_right.width;
        let heights_equal = self.top_left.height == self.bottom_left.height
            && self.bottom_left.height == self.top_right.height
            && self.top_right.height == self.bottom_right.height;
        widths_equal && heights_equal
    }
}

/// Appends a rounded rect outline to a path, clockwise from the top-left corner.
pub(crate) fn add_rounded_rect(path: &mut BezPath, rounded: &RoundedRect) {
    if rounded.radii.is_zero() {
        add_rect(path, rounded.rect);
        return;
    }

    let r = rounded.rect;
    let radii = &rounded.radii;

    path.move_to(Point::new(r.x0 + radii.top_left.width, r.y0));
    path.line_to(Point::new(r.x1 - radii.top_right.width, r.y0));
    corner_arc(path, Point::new(r.x1, r.y0), Point::new(r.x1, r.y0 + radii.top_right.height));
    path.line_to(Point::new(r.x1, r.y1 - radii.bottom_right.height));
    corner_arc(path, Point::new(r.x1, r.y1), Point::new(r.x1 - radii.bottom_right.width, r.y1));
    path.line_to(Point::new(r.x0 + radii.bottom_left.width, r.y1));
    corner_arc(path, Point::new(r.x0, r.y1), Point::new(r.x0, r.y1 - radii.bottom_left.height));
    path.line_to(Point::new(r.x0, r.y0 + radii.top_left.height));
    corner_arc(path, Point::new(r.x0, r.y0), Point::new(r.x0 + radii.top_left.width, r.y0));
    path.close_path();
}

/// One quarter-ellipse corner as a cubic that bends toward `corner` and ends
/// at `to`. The start point is the path's current point.
fn corner_arc(path: &mut BezPath, corner: Point, to: Point) {
    let from = last_point(path);
    let c1 = from + (corner - from) * KAPPA;
    let c2 = to + (corner - to) * KAPPA;
    path.curve_to(c1, c2, to);
}

fn last_point(path: &BezPath) -> Point {
    use piet::kurbo::PathEl;

    match path.elements().last() {
        Some(PathEl::MoveTo(p)) | Some(PathEl::LineTo(p)) => *p,
        Some(PathEl::QuadTo(_, p)) | Some(PathEl::CurveTo(_, _, p)) => *p,
        _ => Point::ORIGIN,
    }
}

/// Appends an axis-aligned rect outline to a path.
pub(crate) fn add_rect(path: &mut BezPath, rect: Rect) {
    path.move_to(Point::new(rect.x0, rect.y0));
    path.line_to(Point::new(rect.x1, rect.y0));
    path.line_to(Point::new(rect.x1, rect.y1));
    path.line_to(Point::new(rect.x0, rect.y1));
    path.close_path();
}

/// Appends an ellipse inscribed in `rect` to a path.
pub(crate) fn add_ellipse_in_rect(path: &mut BezPath, rect: Rect) {
    let c = rect.center();
    let rx = rect.width() / 2.0;
    let ry = rect.height() / 2.0;

    path.move_to(Point::new(rect.x1, c.y));
    path.curve_to(
        Point::new(rect.x1, c.y + ry * KAPPA),
        Point::new(c.x + rx * KAPPA, rect.y1),
        Point::new(c.x, rect.y1),
    );
    path.curve_to(
        Point::new(c.x - rx * KAPPA, rect.y1),
        Point::new(rect.x0, c.y + ry * KAPPA),
        Point::new(rect.x0, c.y),
    );
    path.curve_to(
        Point::new(rect.x0, c.y - ry * KAPPA),
        Point::new(c.x - rx * KAPPA, rect.y0),
        Point::new(c.x, rect.y0),
    );
    path.curve_to(
        Point::new(c.x + rx * KAPPA, rect.y0),
        Point::new(rect.x1, c.y - ry * KAPPA),
        Point::new(rect.x1, c.y),
    );
    path.close_path();
}

/// Returns the endpoints if the path is exactly one line segment.
pub(crate) fn single_line_segment(path: &BezPath) -> Option<(Point, Point)> {
    use piet::kurbo::PathEl;

    match path.elements() {
        [PathEl::MoveTo(start), PathEl::LineTo(end)] => Some((*start, *end)),
        _ => None,
    }
}
