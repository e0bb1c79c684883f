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

//! The painting operations.
//!
//! Everything here reads the mirrored state, does its coordinate work in user
//! space and hands finished primitives to the backend. Operations that have to
//! deviate from the mirrored state (color swaps, temporary blend modes) poke
//! the backend directly and put it back before returning, so the mirror stays
//! truthful without a flush.

use piet::kurbo::{Affine, BezPath, Point, Rect, Shape, Size, Vec2};
use piet::Color;
use tinyvec::TinyVec;

use crate::backend::{BackendContext, BackendStyle, PathDrawingMode, PatternDraw, ToneMappingInfo};
use crate::brush::{Brush, Gradient, TilePattern};
use crate::geometry::{
    add_ellipse_in_rect, add_rect, add_rounded_rect, essentially_equal, is_rotate_or_shear,
    rect_contains_rect, rects_intersect, round_to_device_pixels_non_identity, single_line_segment,
    transposed_rect, transposed_size, RoundedRect,
};
use crate::image::{DynamicRangeLimit, ImagePaintingOptions, NativeImage};
use crate::main_thread::{MainThreadQueue, MainThreadReleased};
use crate::state::{BlendMode, StrokeStyle, WindRule};
use crate::style::{select_blend_mode, user_to_base_ctm};
use crate::{GraphicsContext, InterpolationQuality, RenderingMode};

/// Step used for the non-repeating axis of a tile pattern; far enough out
/// that a second tile never lands inside any plausible clip.
const NO_REPEAT_PATTERN_STEP: f64 = 1.0e9;

impl<C: BackendContext> GraphicsContext<C> {
    // Paths.

    /// Fills `path` with the current fill brush.
    pub fn fill_path(&mut self, path: &BezPath) {
        if path.elements().is_empty() || self.backend.is_none() {
            return;
        }

        if let Some(gradient) = self.current().fill_brush.gradient().cloned() {
            let space_transform = self.current().fill_brush.gradient_space_transform();
            let even_odd = self.current().fill_rule == WindRule::EvenOdd;

            if self.current().has_visible_shadow() {
                // Render through an offscreen layer so the backend shadow
                // applies to the composited gradient, not each slice of it.
                let rect = path.bounding_box();
                let Some(backend) = self.backend.as_mut() else {
                    return;
                };
                let layer_size = crate::geometry::map_size(backend.ctm(), rect.size());
                if let Some(mut layer) = backend.create_layer(layer_size) {
                    let layer_context = C::layer_context(&mut layer);
                    layer_context.scale_ctm(
                        layer_size.width / rect.width(),
                        layer_size.height / rect.height(),
                    );
                    layer_context.translate_ctm(-rect.x0, -rect.y0);
                    layer_context.begin_path();
                    layer_context.add_path(path);
                    layer_context.concat_ctm(space_transform);
                    if even_odd {
                        layer_context.eo_clip();
                    } else {
                        layer_context.clip();
                    }
                    layer_context.paint_gradient(&gradient);
                    backend.draw_layer_in_rect(rect, &layer);
                }
            } else {
                let Some(backend) = self.backend.as_mut() else {
                    return;
                };
                backend.begin_path();
                backend.add_path(path);
                backend.save_gstate();
                backend.concat_ctm(space_transform);
                if even_odd {
                    backend.eo_clip();
                } else {
                    backend.clip();
                }
                backend.paint_gradient(&gradient);
                backend.restore_gstate();
            }
            self.mark_drawn();
            return;
        }

        if self.current().fill_brush.is_pattern() {
            self.apply_fill_pattern();
        }
        let mode = if self.current().fill_rule == WindRule::EvenOdd {
            PathDrawingMode::EoFill
        } else {
            PathDrawingMode::Fill
        };
        if let Some(backend) = self.backend.as_mut() {
            backend.draw_path(path, mode);
        }
        self.mark_drawn();
    }

    /// Strokes `path` with the current stroke brush.
    pub fn stroke_path(&mut self, path: &BezPath) {
        if path.elements().is_empty() || self.backend.is_none() {
            return;
        }

        if let Some(gradient) = self.current().stroke_brush.gradient().cloned() {
            let space_transform = self.current().stroke_brush.gradient_space_transform();

            if self.current().has_visible_shadow() {
                let line_width = self.current().stroke_thickness;
                let rect = path.bounding_box();
                let Some(backend) = self.backend.as_mut() else {
                    return;
                };
                // Inflate by the stroke width so the layer holds the full
                // extent of the stroked outline.
                let adjusted_size = Size::new(
                    (rect.width() + 2.0 * line_width).ceil(),
                    (rect.height() + 2.0 * line_width).ceil(),
                );
                let layer_size = crate::geometry::map_size(backend.ctm(), adjusted_size);
                if let Some(mut layer) = backend.create_layer(layer_size) {
                    let layer_context = C::layer_context(&mut layer);
                    layer_context.set_line_width(line_width);
                    layer_context.scale_ctm(
                        layer_size.width / adjusted_size.width,
                        layer_size.height / adjusted_size.height,
                    );
                    layer_context.translate_ctm(line_width - rect.x0, line_width - rect.y0);
                    layer_context.begin_path();
                    layer_context.add_path(path);
                    layer_context.replace_path_with_stroked_path();
                    layer_context.clip();
                    layer_context.concat_ctm(space_transform);
                    layer_context.paint_gradient(&gradient);
                    let destination = Rect::from_origin_size(
                        ((rect.x0 - line_width).round(), (rect.y0 - line_width).round()),
                        adjusted_size,
                    );
                    backend.draw_layer_in_rect(destination, &layer);
                }
            } else {
                let Some(backend) = self.backend.as_mut() else {
                    return;
                };
                backend.save_gstate();
                backend.begin_path();
                backend.add_path(path);
                backend.replace_path_with_stroked_path();
                backend.clip();
                backend.concat_ctm(space_transform);
                backend.paint_gradient(&gradient);
                backend.restore_gstate();
            }
            self.mark_drawn();
            return;
        }

        if self.current().stroke_brush.is_pattern() {
            self.apply_stroke_pattern();
        }
        if let Some(backend) = self.backend.as_mut() {
            // Strokes of a single segment skip path construction entirely.
            if let Some((start, end)) = single_line_segment(path) {
                backend.stroke_line_segments(&[start, end]);
            } else {
                backend.draw_path(path, PathDrawingMode::Stroke);
            }
        }
        self.mark_drawn();
    }

    /// Fills and/or strokes `path` per the visibility of the two brushes.
    pub fn draw_path(&mut self, path: &BezPath) {
        if path.elements().is_empty() || self.backend.is_none() {
            return;
        }

        // Gradients need their own clip-and-paint passes.
        if self.current().fill_brush.is_gradient() || self.current().stroke_brush.is_gradient() {
            self.fill_path(path);
            self.stroke_path(path);
            return;
        }

        if self.current().fill_brush.is_pattern() {
            self.apply_fill_pattern();
        }
        if self.current().stroke_brush.is_pattern() {
            self.apply_stroke_pattern();
        }
        if let Some(mode) = self.calculate_drawing_mode() {
            if let Some(backend) = self.backend.as_mut() {
                backend.draw_path(path, mode);
            }
            self.mark_drawn();
        }
    }

    fn calculate_drawing_mode(&self) -> Option<PathDrawingMode> {
        let state = self.current();
        let should_fill = brush_is_visible(&state.fill_brush);
        let should_stroke =
            brush_is_visible(&state.stroke_brush) || state.stroke_style != StrokeStyle::NoStroke;
        let even_odd = state.fill_rule == WindRule::EvenOdd;
        match (should_fill, should_stroke, even_odd) {
            (true, true, false) => Some(PathDrawingMode::FillStroke),
            (true, true, true) => Some(PathDrawingMode::EoFillStroke),
            (true, false, false) => Some(PathDrawingMode::Fill),
            (true, false, true) => Some(PathDrawingMode::EoFill),
            (false, true, _) => Some(PathDrawingMode::Stroke),
            (false, false, _) => None,
        }
    }

    // Rectangles.

    /// Fills `rect` with the current fill brush.
    pub fn fill_rect(&mut self, rect: Rect) {
        if self.backend.is_none() {
            return;
        }

        if let Some(gradient) = self.current().fill_brush.gradient().cloned() {
            let space_transform = self.current().fill_brush.gradient_space_transform();
            self.fill_rect_with_gradient(rect, &gradient, space_transform, true);
            return;
        }

        if self.current().fill_brush.is_pattern() {
            self.apply_fill_pattern();
        }
        let draw_own_shadow = self.can_use_shadow_blur();
        let shadow = self.current().drop_shadow();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if draw_own_shadow {
            backend.save_gstate();
            backend.set_style(None);
            if let Some(shadow) = shadow {
                draw_own_rect_shadow(backend, rect, None, &shadow);
            }
        }
        backend.fill_rect(rect);
        if draw_own_shadow {
            backend.restore_gstate();
        }
        self.mark_drawn();
    }

    /// Fills `rect` with `gradient`, painted through `space_transform`.
    pub fn fill_rect_with_gradient(
        &mut self,
        rect: Rect,
        gradient: &Gradient,
        space_transform: Affine,
        requires_clip_to_rect: bool,
    ) {
        let has_shadow = self.current().has_visible_shadow();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.save_gstate();
        if has_shadow {
            let layer_size = crate::geometry::map_size(backend.ctm(), rect.size());
            if let Some(mut layer) = backend.create_layer(layer_size) {
                let layer_context = C::layer_context(&mut layer);
                layer_context.scale_ctm(
                    layer_size.width / rect.width(),
                    layer_size.height / rect.height(),
                );
                layer_context.translate_ctm(-rect.x0, -rect.y0);
                layer_context.begin_path();
                layer_context.add_rect(rect);
                layer_context.clip();
                layer_context.concat_ctm(space_transform);
                layer_context.paint_gradient(gradient);
                backend.draw_layer_in_rect(rect, &layer);
            }
        } else {
            if requires_clip_to_rect {
                backend.clip_to_rect(rect);
            }
            backend.concat_ctm(space_transform);
            backend.paint_gradient(gradient);
        }
        backend.restore_gstate();
        self.mark_drawn();
    }

    /// Fills `rect` with `color`, leaving the current fill brush untouched.
    pub fn fill_rect_with_color(&mut self, rect: Rect, color: Color) {
        if self.backend.is_none() {
            return;
        }
        let old_fill_color = self.current().fill_brush.color();
        let needs_swap = color != old_fill_color || self.current().fill_brush.custom().is_some();
        let draw_own_shadow = self.can_use_shadow_blur();
        let shadow = self.current().drop_shadow();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if needs_swap {
            backend.set_fill_color(color);
        }
        if draw_own_shadow {
            backend.save_gstate();
            backend.set_style(None);
            if let Some(shadow) = shadow {
                draw_own_rect_shadow(backend, rect, None, &shadow);
            }
        }
        backend.fill_rect(rect);
        if draw_own_shadow {
            backend.restore_gstate();
        }
        if needs_swap {
            backend.set_fill_color(old_fill_color);
        }
        self.mark_drawn();
    }

    /// Fills a rounded rect with `color`, compositing with `blend_mode` for
    /// the duration of the fill.
    pub fn fill_rounded_rect(&mut self, rounded: &RoundedRect, color: Color, blend_mode: BlendMode) {
        if self.backend.is_none() {
            return;
        }
        let operator = self.current().composite_operator;
        let old_blend_mode = self.current().blend_mode;
        self.set_composite_mode(operator, blend_mode);
        if rounded.radii.is_zero() {
            self.fill_rect_with_color(rounded.rect, color);
        } else {
            self.fill_rounded_rect_impl(rounded, color);
        }
        self.set_composite_mode(operator, old_blend_mode);
    }

    fn fill_rounded_rect_impl(&mut self, rounded: &RoundedRect, color: Color) {
        let old_fill_color = self.current().fill_brush.color();
        let has_custom_fill = self.current().fill_brush.custom().is_some();
        let needs_swap = color != old_fill_color || has_custom_fill;
        let draw_own_shadow = self.can_use_shadow_blur();
        let shadow = self.current().drop_shadow();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if needs_swap {
            backend.set_fill_color(color);
        }
        if draw_own_shadow {
            backend.save_gstate();
            backend.set_style(None);
            if let Some(shadow) = shadow {
                draw_own_rect_shadow(backend, rounded.rect, Some(rounded), &shadow);
            }
        }

        let rect = rounded.rect;
        let radii = &rounded.radii;
        let is_ellipse = !has_custom_fill
            && radii.is_uniform()
            && essentially_equal(2.0 * radii.top_left.width, rect.width())
            && essentially_equal(2.0 * radii.top_left.height, rect.height());
        if is_ellipse {
            backend.fill_ellipse_in_rect(rect);
        } else {
            let mut path = BezPath::new();
            add_rounded_rect(&mut path, rounded);
            backend.draw_path(&path, PathDrawingMode::Fill);
        }

        if draw_own_shadow {
            backend.restore_gstate();
        }
        if needs_swap {
            backend.set_fill_color(old_fill_color);
        }
        self.mark_drawn();
    }

    /// Fills `rect` minus a (possibly rounded) hole, using an even-odd fill.
    pub fn fill_rect_with_rounded_hole(&mut self, rect: Rect, hole: &RoundedRect, color: Color) {
        if self.backend.is_none() {
            return;
        }
        let mut path = BezPath::new();
        add_rect(&mut path, rect);
        if hole.radii.is_zero() {
            add_rect(&mut path, hole.rect);
        } else {
            add_rounded_rect(&mut path, hole);
        }

        let old_fill_rule = self.current().fill_rule;
        let old_fill_color = self.current().fill_brush.color();
        let draw_own_shadow = self.can_use_shadow_blur();
        let shadow = self.current().drop_shadow();

        self.set_fill_rule(WindRule::EvenOdd);
        self.set_fill_color(color);

        if draw_own_shadow {
            if let Some(backend) = self.backend.as_mut() {
                backend.save_gstate();
                backend.set_style(None);
                if let Some(shadow) = shadow {
                    draw_own_inset_shadow(backend, &path, &shadow);
                }
            }
        }
        self.fill_path(&path);
        if draw_own_shadow {
            if let Some(backend) = self.backend.as_mut() {
                backend.restore_gstate();
            }
        }

        self.set_fill_rule(old_fill_rule);
        self.set_fill_color(old_fill_color);
    }

    /// Strokes the outline of `rect` with a one-off line width.
    pub fn stroke_rect(&mut self, rect: Rect, line_width: f64) {
        if self.backend.is_none() {
            return;
        }

        if let Some(gradient) = self.current().stroke_brush.gradient().cloned() {
            let space_transform = self.current().stroke_brush.gradient_space_transform();
            let has_shadow = self.current().has_visible_shadow();
            let Some(backend) = self.backend.as_mut() else {
                return;
            };
            if has_shadow {
                let adjusted_size = Size::new(
                    (rect.width() + 2.0 * line_width).ceil(),
                    (rect.height() + 2.0 * line_width).ceil(),
                );
                let layer_size = crate::geometry::map_size(backend.ctm(), adjusted_size);
                if let Some(mut layer) = backend.create_layer(layer_size) {
                    let layer_context = C::layer_context(&mut layer);
                    layer_context.set_line_width(line_width);
                    layer_context.scale_ctm(
                        layer_size.width / adjusted_size.width,
                        layer_size.height / adjusted_size.height,
                    );
                    layer_context.translate_ctm(line_width - rect.x0, line_width - rect.y0);
                    layer_context.begin_path();
                    layer_context.add_rect(rect);
                    layer_context.replace_path_with_stroked_path();
                    layer_context.clip();
                    layer_context.concat_ctm(space_transform);
                    layer_context.paint_gradient(&gradient);
                    let destination = Rect::from_origin_size(
                        ((rect.x0 - line_width).round(), (rect.y0 - line_width).round()),
                        adjusted_size,
                    );
                    backend.draw_layer_in_rect(destination, &layer);
                }
            } else {
                backend.save_gstate();
                backend.set_line_width(line_width);
                backend.begin_path();
                backend.add_rect(rect);
                backend.replace_path_with_stroked_path();
                backend.clip();
                backend.concat_ctm(space_transform);
                backend.paint_gradient(&gradient);
                backend.restore_gstate();
            }
            self.mark_drawn();
            return;
        }

        if self.current().stroke_brush.is_pattern() {
            self.apply_stroke_pattern();
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.save_gstate();
        backend.set_line_width(line_width);
        backend.begin_path();
        backend.add_rect(rect);
        backend.stroke_path();
        backend.restore_gstate();
        self.mark_drawn();
    }

    /// Clears `rect` to transparent black.
    pub fn clear_rect(&mut self, rect: Rect) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.clear_rect(rect);
        self.mark_drawn();
    }

    /// Fills `rect` and, when a stroke style is active, paints a border of
    /// `border_thickness` inside it as four filled strips.
    pub fn draw_rect(&mut self, rect: Rect, border_thickness: f64) {
        debug_assert!(!crate::geometry::rect_is_empty(rect));
        if self.backend.is_none() {
            return;
        }
        let stroke_color = self.current().stroke_brush.color();
        let fill_color = self.current().fill_brush.color();
        let has_stroke = self.current().stroke_style != StrokeStyle::NoStroke;
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.fill_rect(rect);
        if has_stroke {
            let t = border_thickness;
            let needs_swap = stroke_color != fill_color;
            if needs_swap {
                backend.set_fill_color(stroke_color);
            }
            let borders = [
                Rect::new(rect.x0, rect.y0, rect.x1, rect.y0 + t),
                Rect::new(rect.x0, rect.y1 - t, rect.x1, rect.y1),
                Rect::new(rect.x0, rect.y0 + t, rect.x0 + t, rect.y1 - t),
                Rect::new(rect.x1 - t, rect.y0 + t, rect.x1, rect.y1 - t),
            ];
            backend.fill_rects(&borders);
            if needs_swap {
                backend.set_fill_color(fill_color);
            }
        }
        self.mark_drawn();
    }

    // Ellipses.

    /// Fills the ellipse inscribed in `rect`.
    pub fn fill_ellipse(&mut self, rect: Rect) {
        if self.backend.is_none() {
            return;
        }
        if self.current().fill_brush.custom().is_some() {
            let mut path = BezPath::new();
            add_ellipse_in_rect(&mut path, rect);
            self.fill_path(&path);
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.fill_ellipse_in_rect(rect);
        }
        self.mark_drawn();
    }

    /// Strokes the ellipse inscribed in `rect`.
    pub fn stroke_ellipse(&mut self, rect: Rect) {
        if self.backend.is_none() {
            return;
        }
        if self.current().stroke_brush.custom().is_some() {
            let mut path = BezPath::new();
            add_ellipse_in_rect(&mut path, rect);
            self.stroke_path(&path);
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.stroke_ellipse_in_rect(rect);
        }
        self.mark_drawn();
    }

    /// Fills and strokes the ellipse inscribed in `rect` per the brushes.
    pub fn draw_ellipse(&mut self, rect: Rect) {
        let mut path = BezPath::new();
        add_ellipse_in_rect(&mut path, rect);
        self.draw_path(&path);
    }

    // Lines.

    /// Draws an axis-aligned line between `point1` and `point2`, honoring
    /// dotted and dashed stroke styles with squared-off corners.
    pub fn draw_line(&mut self, point1: Point, point2: Point) {
        if self.current().stroke_style == StrokeStyle::NoStroke || self.backend.is_none() {
            return;
        }

        let thickness = self.current().stroke_thickness;
        let is_vertical_line = point1.x + thickness == point2.x;
        let mut stroke_width = if is_vertical_line {
            point2.y - point1.y
        } else {
            point2.x - point1.x
        };
        if thickness == 0.0 || stroke_width == 0.0 {
            return;
        }

        let stroke_style = self.current().stroke_style;
        let stroke_color = self.current().stroke_brush.color();
        let should_antialias = self.current().should_antialias;
        let draws_dashed_line =
            stroke_style == StrokeStyle::Dotted || stroke_style == StrokeStyle::Dashed;

        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        let mut corner_width = 0.0;
        if draws_dashed_line {
            backend.save_gstate();

            // Paint the endpoints solid so the pattern never clips a corner.
            corner_width = dashed_line_corner_width(stroke_style, thickness, stroke_width);
            backend.set_fill_color(stroke_color);
            if is_vertical_line {
                backend.fill_rect(Rect::from_origin_size(
                    (point1.x, point1.y),
                    (thickness, corner_width),
                ));
                backend.fill_rect(Rect::from_origin_size(
                    (point1.x, point2.y - corner_width),
                    (thickness, corner_width),
                ));
            } else {
                backend.fill_rect(Rect::from_origin_size(
                    (point1.x, point1.y),
                    (corner_width, thickness),
                ));
                backend.fill_rect(Rect::from_origin_size(
                    (point2.x - corner_width, point1.y),
                    (corner_width, thickness),
                ));
            }
            stroke_width -= 2.0 * corner_width;

            let pattern_width = dashed_line_pattern_width(stroke_style, thickness, stroke_width);
            // The corners alone may already cover the whole line.
            if stroke_width <= pattern_width + 1.0 {
                backend.restore_gstate();
                self.mark_drawn();
                return;
            }
            let pattern_offset = dashed_line_pattern_offset(pattern_width, stroke_width);
            backend.set_line_dash(pattern_offset, &[pattern_width, pattern_width]);
        }

        let mut p1 = point1;
        let mut p2 = point2;
        center_line_and_cut_off_corners(is_vertical_line, corner_width, &mut p1, &mut p2);

        if should_antialias {
            backend.set_should_antialias(false);
        }
        backend.begin_path();
        backend.move_to(p1);
        backend.line_to(p2);
        backend.stroke_path();
        if should_antialias {
            backend.set_should_antialias(true);
        }

        if draws_dashed_line {
            backend.restore_gstate();
        }
        self.mark_drawn();
    }

    /// Draws decoration lines under a run of text. Each segment is an
    /// `(start, end)` pair of x offsets from `origin`; `double_lines` adds a
    /// second row below the first. Rects snap to device pixels unless the
    /// output is for print.
    pub fn draw_lines_for_text(
        &mut self,
        origin: Point,
        thickness: f64,
        line_segments: &[(f64, f64)],
        is_printing: bool,
        double_lines: bool,
    ) {
        if line_segments.is_empty() || self.backend.is_none() {
            return;
        }

        let mut rects: TinyVec<[Rect; 4]> = TinyVec::new();
        for &(start, end) in line_segments {
            let rect = Rect::new(origin.x + start, origin.y, origin.x + end, origin.y + thickness);
            rects.push(if is_printing {
                rect
            } else {
                self.round_to_device_pixels(rect)
            });
            if double_lines {
                // The second line sits one line-gap below the first.
                let second = rect + Vec2::new(0.0, 2.0 * thickness);
                rects.push(if is_printing {
                    second
                } else {
                    self.round_to_device_pixels(second)
                });
            }
        }

        let stroke_color = self.current().stroke_brush.color();
        let fill_color = self.current().fill_brush.color();
        let needs_swap = stroke_color != fill_color;
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if needs_swap {
            backend.set_fill_color(stroke_color);
        }
        backend.fill_rects(&rects);
        if needs_swap {
            backend.set_fill_color(fill_color);
        }
        self.mark_drawn();
    }

    // Images.

    /// Draws the `source` portion of `image` into `destination`.
    pub fn draw_native_image(
        &mut self,
        image: &NativeImage<C>,
        destination: Rect,
        source: Rect,
        options: ImagePaintingOptions,
    ) {
        if self.backend.is_none() {
            return;
        }

        let state_operator = self.current().composite_operator;
        let state_blend_mode = self.current().blend_mode;

        let mut headroom = options.headroom.resolve(image);
        if let Some(max) = self.max_edr_headroom {
            headroom = headroom.min(max);
        }
        let is_transient = options.is_transient;

        // Split borrows so the subimage cache can ride alongside the backend.
        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        let image_size = image.size(backend);
        let image_rect = Rect::from_origin_size(Point::ORIGIN, image_size);
        let source = source.abs();
        let destination = destination.abs();
        if !rects_intersect(image_rect, source) {
            return;
        }

        let old_quality = backend.interpolation_quality();
        let quality = if options.interpolation_quality == InterpolationQuality::Default {
            old_quality
        } else {
            options.interpolation_quality
        };
        if quality != old_quality {
            backend.set_interpolation_quality(quality);
        }

        let transform = backend.ctm();
        let orientation = options.effective_orientation(image);
        let mut current_image_size = image_size;
        if orientation.uses_width_as_height() {
            current_image_size = transposed_size(current_image_size);
        }

        let mut draw_handle = image.handle().clone();
        let mut adjusted_destination = destination;
        let mut saved_gstate = false;

        if source != image_rect {
            let scale_x = destination.width() / source.width();
            let scale_y = destination.height() / source.height();

            if should_use_subimage(quality, destination, source, transform) {
                let subimage_rect = source.expand();

                // High-quality interpolation smoothes across the source rect
                // edge, bleeding neighboring pixels into the destination, so
                // crop the source down to just the wanted portion.
                let mut physical_subimage_rect = subimage_rect;
                if !orientation.is_default() {
                    // The crop rect is in logical coordinates; the cropped
                    // image is taken from the undecoded physical pixels.
                    let to_physical =
                        orientation.transform_from_default(current_image_size).inverse();
                    physical_subimage_rect = to_physical.transform_rect_bbox(subimage_rect);
                }
                let Some(subimage) = self.subimage_cache.subimage(
                    backend,
                    image,
                    physical_subimage_rect,
                    is_transient,
                ) else {
                    tracing::trace!("failed to crop image to the source rect");
                    if quality != old_quality {
                        backend.set_interpolation_quality(old_quality);
                    }
                    return;
                };
                draw_handle = subimage;

                let sub_pixel_padding = source.origin() - subimage_rect.origin();
                adjusted_destination = Rect::from_origin_size(
                    (
                        destination.x0 - sub_pixel_padding.x * scale_x,
                        destination.y0 - sub_pixel_padding.y * scale_y,
                    ),
                    (
                        subimage_rect.width() * scale_x,
                        subimage_rect.height() * scale_y,
                    ),
                );
            } else {
                // Low-quality resampling can draw the whole image scaled up
                // and let the clip carve out the source portion.
                adjusted_destination = Rect::from_origin_size(
                    (
                        destination.x0 - source.x0 * scale_x,
                        destination.y0 - source.y0 * scale_y,
                    ),
                    (
                        current_image_size.width * scale_x,
                        current_image_size.height * scale_y,
                    ),
                );
            }

            if !rect_contains_rect(destination, adjusted_destination) {
                backend.save_gstate();
                saved_gstate = true;
                backend.clip_to_rect(destination);
            }
        }

        backend.set_blend_mode(select_blend_mode(
            options.composite_operator,
            options.blend_mode,
        ));

        let changed_headroom = image.headroom() > headroom;
        let mut old_edr_headroom = 0.0;
        if changed_headroom {
            old_edr_headroom = backend.edr_target_headroom();
            backend.set_edr_target_headroom(headroom);
        }

        let set_tone_mapping = options.dynamic_range_limit == DynamicRangeLimit::Standard
            && options.draws_hdr_content(image);
        let mut old_tone_mapping = None;
        if set_tone_mapping {
            old_tone_mapping = backend.content_tone_mapping_info();
            backend.set_content_tone_mapping_info(Some(ToneMappingInfo {
                edr_strength: options.dynamic_range_limit.value(),
                content_average_light_level: 0.0,
                constrained_dynamic_range_strength: options.dynamic_range_limit.value(),
            }));
        }

        // Flip to the image's bottom-up coordinates.
        backend.translate_ctm(adjusted_destination.x0, adjusted_destination.y0);
        let mut adjusted_destination = adjusted_destination.with_origin(Point::ORIGIN);
        if !orientation.is_default() {
            backend.concat_ctm(orientation.transform_from_default(adjusted_destination.size()));
            if orientation.uses_width_as_height() {
                adjusted_destination = transposed_rect(adjusted_destination);
            }
        }
        backend.translate_ctm(0.0, adjusted_destination.height());
        backend.scale_ctm(1.0, -1.0);

        backend.draw_image(adjusted_destination, &draw_handle);

        if saved_gstate {
            backend.restore_gstate();
        } else {
            backend.set_ctm(transform);
            backend.set_blend_mode(select_blend_mode(state_operator, state_blend_mode));
            if set_tone_mapping {
                backend.set_content_tone_mapping_info(old_tone_mapping);
            }
            if changed_headroom {
                backend.set_edr_target_headroom(old_edr_headroom);
            }
        }
        if quality != old_quality {
            backend.set_interpolation_quality(old_quality);
        }
        self.record_painted_headroom(headroom);
        self.mark_drawn();
    }

    /// Tiles the `tile_rect` portion of `image` across `destination`.
    ///
    /// `pattern_transform` scales the tile, `phase` shifts where the tiling
    /// anchors and `spacing` inserts gaps between tiles.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_pattern(
        &mut self,
        image: &NativeImage<C>,
        destination: Rect,
        tile_rect: Rect,
        pattern_transform: Affine,
        phase: Point,
        spacing: Size,
        options: ImagePaintingOptions,
    ) {
        if self.backend.is_none() || pattern_transform.determinant() == 0.0 {
            return;
        }

        let queue = self.main_thread_queue.clone();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let image_size = image.size(backend);
        let decoded_size = backend.decoded_image_size(image.handle());

        backend.save_gstate();
        backend.clip_to_rect(destination);
        backend.set_blend_mode(select_blend_mode(
            options.composite_operator,
            options.blend_mode,
        ));
        backend.translate_ctm(destination.x0, destination.y0 + destination.height());
        backend.scale_ctm(1.0, -1.0);

        let [a, _, _, d, _, _] = pattern_transform.as_coeffs();
        let scaled_tile_height = tile_rect.height() * d;
        let adjusted_x = phase.x - destination.x0 + tile_rect.x0 * a;
        let adjusted_y =
            destination.height() - (phase.y - destination.y0 + tile_rect.y0 * d + scaled_tile_height);

        let mut tile_handle = image.handle().clone();
        if tile_rect.size() != image_size {
            let Some(subimage) = backend.create_subimage(image.handle(), tile_rect) else {
                tracing::trace!("failed to crop image to the tile rect");
                backend.restore_gstate();
                return;
            };
            tile_handle = subimage;
        }

        // A fully decoded, gap-free tile can go through the tiled fast path.
        if decoded_size == image_size && spacing == Size::ZERO {
            backend.draw_tiled_image(
                Rect::from_origin_size(
                    (adjusted_x, adjusted_y),
                    (tile_rect.width() * a, tile_rect.height() * d),
                ),
                &tile_handle,
            );
            backend.restore_gstate();
            self.mark_drawn();
            return;
        }

        let tile_matrix = Affine::new([a, 0.0, 0.0, d, adjusted_x, adjusted_y]);
        // Partially decoded images only cover the bottom of their logical
        // rect, so shift the pattern space to compensate.
        let matrix = backend.ctm()
            * tile_matrix
            * Affine::translate((0.0, image_size.height - decoded_size.height));
        let bounds = Rect::from_origin_size(Point::ORIGIN, tile_rect.size());
        let x_step = tile_rect.width() + spacing.width * (1.0 / a);
        let y_step = tile_rect.height() + spacing.height * (1.0 / d);

        let released = MainThreadReleased::new(tile_handle, queue);
        let draw: PatternDraw<C> = Box::new(move |context: &mut C| {
            let size = context.image_size(released.get());
            let rect = Rect::from_origin_size(Point::ORIGIN, size);
            let rect =
                round_to_device_pixels_non_identity(context.user_to_device_transform(), rect);
            context.draw_image(rect, released.get());
        });
        if let Some(pattern) = backend.create_pattern(bounds, matrix, x_step, y_step, draw) {
            // Pattern space is anchored to the device, not the user space the
            // clip was computed in.
            let old_base_ctm = backend.base_ctm();
            backend.set_base_ctm(Affine::IDENTITY);
            backend.set_pattern_phase(Vec2::ZERO);
            backend.set_fill_pattern(&pattern, 1.0);
            let clip_bounds = backend.clip_bounding_box();
            backend.fill_rect(clip_bounds);
            backend.set_base_ctm(old_base_ctm);
        }
        backend.restore_gstate();
        self.mark_drawn();
    }

    // Pattern brushes.

    fn apply_fill_pattern(&mut self) {
        let Some(pattern) = self.current().fill_brush.pattern().cloned() else {
            return;
        };
        let queue = self.main_thread_queue.clone();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if let Some(platform_pattern) = create_tile_pattern(backend, &pattern, queue) {
            backend.set_fill_pattern(&platform_pattern, 1.0);
        }
    }

    fn apply_stroke_pattern(&mut self) {
        let Some(pattern) = self.current().stroke_brush.pattern().cloned() else {
            return;
        };
        let queue = self.main_thread_queue.clone();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        if let Some(platform_pattern) = create_tile_pattern(backend, &pattern, queue) {
            backend.set_stroke_pattern(&platform_pattern, 1.0);
        }
    }

    // Shadows.

    /// Whether the shadow should be rasterized here instead of by the
    /// backend. Software targets blur faster on the CPU side; shadows that
    /// ignore transforms must stay with the backend, which applies them in
    /// base space.
    fn can_use_shadow_blur(&self) -> bool {
        self.rendering_mode() == RenderingMode::Unaccelerated
            && !self.current().shadows_ignore_transforms
            && self.current().has_blurred_shadow()
    }
}

fn brush_is_visible<C: BackendContext>(brush: &Brush<C>) -> bool {
    brush.custom().is_some() || brush.color().as_rgba().3 > 0.0
}

/// Builds a platform pattern for a tile-image brush. The pattern matrix maps
/// tile space through the brush transform into base space, so the tiling
/// stays put while the CTM moves under it.
fn create_tile_pattern<C: BackendContext>(
    backend: &mut C,
    pattern: &TilePattern<C>,
    queue: Option<MainThreadQueue>,
) -> Option<C::Pattern> {
    let tile_size = pattern.tile_image.size(backend);
    let bounds = Rect::from_origin_size(Point::ORIGIN, tile_size);
    let user_to_base = user_to_base_ctm(backend.ctm(), backend.base_ctm());
    let matrix = user_to_base * pattern.transform;
    let x_step = if pattern.repeat_x {
        tile_size.width
    } else {
        NO_REPEAT_PATTERN_STEP
    };
    let y_step = if pattern.repeat_y {
        tile_size.height
    } else {
        NO_REPEAT_PATTERN_STEP
    };

    let released = MainThreadReleased::new(pattern.tile_image.handle().clone(), queue);
    let draw: PatternDraw<C> = Box::new(move |context: &mut C| {
        let size = context.image_size(released.get());
        context.draw_image(Rect::from_origin_size(Point::ORIGIN, size), released.get());
    });
    backend.create_pattern(bounds, matrix, x_step, y_step, draw)
}

/// Rasterizes a blurred rect (or rounded rect) shadow directly, with the
/// backend's own shadow machinery switched off by the caller.
fn draw_own_rect_shadow<C: BackendContext>(
    backend: &mut C,
    rect: Rect,
    rounded: Option<&RoundedRect>,
    shadow: &crate::DropShadow,
) {
    backend.save_gstate();
    backend.translate_ctm(shadow.offset.x, shadow.offset.y);
    backend.set_style(Some(BackendStyle::GaussianBlur {
        normalization: 1.0,
        radius: shadow.radius,
    }));
    backend.set_fill_color(shadow.color.with_alpha(shadow.opacity));
    match rounded {
        Some(rounded) if !rounded.radii.is_zero() => {
            let mut path = BezPath::new();
            add_rounded_rect(&mut path, rounded);
            backend.draw_path(&path, PathDrawingMode::Fill);
        }
        _ => backend.fill_rect(rect),
    }
    backend.restore_gstate();
}

/// The inset variant: the shadow hugs the inside of the hole, so the same
/// even-odd region is filled offset and blurred.
fn draw_own_inset_shadow<C: BackendContext>(
    backend: &mut C,
    path: &BezPath,
    shadow: &crate::DropShadow,
) {
    backend.save_gstate();
    backend.translate_ctm(shadow.offset.x, shadow.offset.y);
    backend.set_style(Some(BackendStyle::GaussianBlur {
        normalization: 1.0,
        radius: shadow.radius,
    }));
    backend.set_fill_color(shadow.color.with_alpha(shadow.opacity));
    backend.draw_path(path, PathDrawingMode::EoFill);
    backend.restore_gstate();
}

/// Whether a scaled partial-image draw has to crop the source first.
/// High-quality resampling reads past the source rect edge, so any upscale
/// or anisotropic scale gets a real subimage.
fn should_use_subimage(
    quality: InterpolationQuality,
    destination: Rect,
    source: Rect,
    transform: Affine,
) -> bool {
    if quality == InterpolationQuality::DoNotInterpolate {
        return false;
    }
    if is_rotate_or_shear(transform) {
        return true;
    }
    // Scale magnitudes, so a flipped CTM does not read as anisotropic.
    let x_scale = destination.width() * crate::geometry::x_scale(transform) / source.width();
    let y_scale = destination.height() * crate::geometry::y_scale(transform) / source.height();
    !essentially_equal(x_scale, y_scale) || x_scale > 1.0
}

// Dashed and dotted lines paint their endpoints as solid squares and lay the
// dash pattern over what remains, balanced so both ends land on a dash.

fn dashed_line_corner_width(style: StrokeStyle, thickness: f64, stroke_width: f64) -> f64 {
    if style == StrokeStyle::Dotted {
        thickness
    } else {
        (2.0 * thickness).min(thickness.max(stroke_width / 3.0))
    }
}

fn dashed_line_pattern_width(style: StrokeStyle, thickness: f64, stroke_width: f64) -> f64 {
    if style == StrokeStyle::Dotted {
        thickness
    } else {
        (3.0 * thickness).min(thickness.max(stroke_width / 3.0))
    }
}

fn dashed_line_pattern_offset(pattern_width: f64, stroke_width: f64) -> f64 {
    // Start with the empty phase after the corner, then shift so the pattern
    // is balanced between the two ends.
    let mut pattern_offset = pattern_width;
    let number_of_segments = (stroke_width / pattern_width).floor();
    let odd_number_of_segments = (number_of_segments as i64) % 2 != 0;
    let remainder = stroke_width - number_of_segments * pattern_width;
    if odd_number_of_segments && remainder != 0.0 {
        pattern_offset -= remainder / 2.0;
    } else if !odd_number_of_segments {
        if remainder != 0.0 {
            pattern_offset += pattern_offset - (pattern_width + remainder) / 2.0;
        } else {
            pattern_offset += pattern_width / 2.0;
        }
    }
    pattern_offset
}

fn center_line_and_cut_off_corners(
    is_vertical_line: bool,
    corner_width: f64,
    p1: &mut Point,
    p2: &mut Point,
) {
    if is_vertical_line {
        let center_offset = (p2.x - p1.x) / 2.0;
        p1.x += center_offset;
        p1.y += corner_width;
        p2.x -= center_offset;
        p2.y -= corner_width;
    } else {
        let center_offset = (p2.y - p1.y) / 2.0;
        p1.x += corner_width;
        p1.y += center_offset;
        p2.x -= corner_width;
        p2.y -= center_offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::noop::NoopBackend;

    #[test]
    fn drawing_mode_covers_brush_combinations() {
        let mut gc = GraphicsContext::new(NoopBackend);
        assert_eq!(gc.calculate_drawing_mode(), Some(PathDrawingMode::FillStroke));

        gc.set_stroke_color(Color::TRANSPARENT);
        gc.set_stroke_style(StrokeStyle::NoStroke);
        assert_eq!(gc.calculate_drawing_mode(), Some(PathDrawingMode::Fill));

        gc.set_fill_rule(WindRule::EvenOdd);
        assert_eq!(gc.calculate_drawing_mode(), Some(PathDrawingMode::EoFill));

        gc.set_fill_color(Color::TRANSPARENT);
        assert_eq!(gc.calculate_drawing_mode(), None);

        gc.set_stroke_style(StrokeStyle::Solid);
        assert_eq!(gc.calculate_drawing_mode(), Some(PathDrawingMode::Stroke));
    }

    #[test]
    fn transparent_brushes_are_invisible() {
        let mut brush: Brush<NoopBackend> = Brush::default();
        assert!(brush_is_visible(&brush));
        brush.set_color(Color::TRANSPARENT);
        assert!(!brush_is_visible(&brush));

        let mut gradient = Gradient::new(crate::GradientKind::Linear {
            start: Point::ORIGIN,
            end: Point::new(1.0, 0.0),
        });
        gradient.add_color_stop(0.0, Color::TRANSPARENT);
        brush.set_gradient(std::rc::Rc::new(gradient), Affine::IDENTITY);
        assert!(brush_is_visible(&brush));
    }

    #[test]
    fn dotted_corner_and_pattern_match_thickness() {
        assert_eq!(dashed_line_corner_width(StrokeStyle::Dotted, 3.0, 100.0), 3.0);
        assert_eq!(dashed_line_pattern_width(StrokeStyle::Dotted, 3.0, 100.0), 3.0);
    }

    #[test]
    fn dashed_widths_scale_with_thickness_but_cap_at_a_third() {
        // Long line: the 2x/3x thickness caps win.
        assert_eq!(dashed_line_corner_width(StrokeStyle::Dashed, 2.0, 300.0), 4.0);
        assert_eq!(dashed_line_pattern_width(StrokeStyle::Dashed, 2.0, 300.0), 6.0);
        // Short line: a third of the line wins.
        assert_eq!(dashed_line_corner_width(StrokeStyle::Dashed, 10.0, 36.0), 12.0);
        assert_eq!(dashed_line_pattern_width(StrokeStyle::Dashed, 10.0, 36.0), 12.0);
    }

    #[test]
    fn pattern_offset_balances_even_and_odd_segment_counts() {
        // Ten exact segments: even, no remainder, offset gains half a dash.
        assert_eq!(dashed_line_pattern_offset(10.0, 100.0), 15.0);
        // Nine exact segments: odd, no remainder, offset stays a full dash.
        assert_eq!(dashed_line_pattern_offset(10.0, 90.0), 10.0);
        // Odd with remainder: pulled back by half the remainder.
        assert_eq!(dashed_line_pattern_offset(10.0, 94.0), 8.0);
        // Even with remainder: 10 + (10 - (10 + 4) / 2) = 13.
        assert_eq!(dashed_line_pattern_offset(10.0, 104.0), 13.0);
    }

    #[test]
    fn centering_cuts_corners_off_both_ends() {
        let mut p1 = Point::new(10.0, 20.0);
        let mut p2 = Point::new(14.0, 120.0);
        center_line_and_cut_off_corners(true, 6.0, &mut p1, &mut p2);
        assert_eq!(p1, Point::new(12.0, 26.0));
        assert_eq!(p2, Point::new(12.0, 114.0));

        let mut p1 = Point::new(10.0, 20.0);
        let mut p2 = Point::new(110.0, 24.0);
        center_line_and_cut_off_corners(false, 6.0, &mut p1, &mut p2);
        assert_eq!(p1, Point::new(16.0, 22.0));
        assert_eq!(p2, Point::new(104.0, 22.0));
    }

    #[test]
    fn subimage_only_for_quality_scaled_draws() {
        let dest = Rect::new(0.0, 0.0, 50.0, 50.0);
        let src = Rect::new(0.0, 0.0, 100.0, 100.0);
        // Downscale at uniform scale: no crop needed.
        assert!(!should_use_subimage(
            InterpolationQuality::Default,
            dest,
            src,
            Affine::IDENTITY
        ));
        // Upscale: crop.
        let dest_up = Rect::new(0.0, 0.0, 200.0, 200.0);
        assert!(should_use_subimage(
            InterpolationQuality::Default,
            dest_up,
            src,
            Affine::IDENTITY
        ));
        // Rotation always crops.
        assert!(should_use_subimage(
            InterpolationQuality::Default,
            dest,
            src,
            Affine::rotate(0.3)
        ));
        // No interpolation never crops.
        assert!(!should_use_subimage(
            InterpolationQuality::DoNotInterpolate,
            dest_up,
            src,
            Affine::rotate(0.3)
        ));
        // A flipped CTM is neither an upscale nor anisotropic.
        assert!(!should_use_subimage(
            InterpolationQuality::Default,
            dest,
            src,
            Affine::scale_non_uniform(1.0, -1.0)
        ));
    }

    #[test]
    fn transform_exempt_shadows_skip_the_software_blur() {
        let mut gc = GraphicsContext::new(NoopBackend);
        gc.set_drop_shadow(crate::DropShadow {
            color: Color::BLACK,
            offset: Vec2::new(1.0, 1.0),
            radius: 3.0,
            opacity: 1.0,
        });
        assert!(gc.can_use_shadow_blur());

        gc.set_shadows_ignore_transforms(true);
        assert!(!gc.can_use_shadow_blur());
        gc.set_shadows_ignore_transforms(false);
        assert!(gc.can_use_shadow_blur());
    }
}
