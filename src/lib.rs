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

//! A stateful 2D vector drawing context layered over a platform backend.
//!
//! The centerpiece of this crate is the [`GraphicsContext`] structure, which
//! wraps a value implementing [`BackendContext`] and exposes the drawing
//! surface a renderer wants: brushes, composite modes, shadows, clipping,
//! transparency layers, image and pattern painting.
//!
//! The adapter keeps a mirror of the drawing state on its own stack and
//! pushes only the pieces a mutation actually changed into the backend. This
//! keeps redundant backend calls off hot paths and lets the adapter answer
//! state queries without a backend round trip.
//!
//! A context can be neutered by taking its backend out; every operation on a
//! neutered context is a quiet no-op, which lets callers paint into a context
//! that lost its surface without sprinkling checks everywhere.

mod backend;
mod brush;
mod geometry;
mod image;
mod main_thread;
mod paint;
mod state;
mod style;

use std::cell::Cell;

use piet::kurbo::{Affine, BezPath, Point, Rect};
use piet::Color;
use tinyvec::TinyVec;

pub use backend::{
    BackendBlendMode, BackendContext, BackendStyle, ColorSpace, ContextType, LineCap, LineJoin,
    PathDrawingMode, PatternDraw, TextDrawingMode, ToneMappingInfo,
};
pub use brush::{Brush, CustomBrush, Gradient, GradientKind, GradientStop, TilePattern};
pub use geometry::{CornerRadii, RoundedRect, INFINITE_RECT};
pub use image::{
    DynamicRangeLimit, Headroom, ImageOrientation, ImagePaintingOptions, NativeImage, SDR_HEADROOM,
};
pub use main_thread::{MainThreadQueue, MainThreadRunner, Task};
pub use state::{
    BlendMode, CompositeOperator, DropShadow, GraphicsContextState, GraphicsStyle,
    InterpolationQuality, StateChangeFlags, StrokeStyle, TextDrawingModeFlags, WindRule,
};

use image::SubimageCache;
use state::{StackEntry, StatePurpose};

/// How the backend realizes drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingMode {
    /// GPU-backed surface.
    Accelerated,

    /// A plain bitmap in main memory.
    Unaccelerated,

    /// A PDF recording context; drawing becomes document operations.
    PdfDocument,
}

/// Whether a CTM query folds in the device scale beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeDeviceScale {
    /// Return the CTM as the backend tracks it.
    Possibly,

    /// Return the full user-to-device transform.
    Definitely,
}

/// A stateful drawing context over a platform backend.
///
/// See the [crate documentation](crate) for an overview.
pub struct GraphicsContext<C: BackendContext> {
    pub(crate) backend: Option<C>,
    pub(crate) stack: TinyVec<[StackEntry<C>; 2]>,
    rendering_mode: RenderingMode,
    is_deferred: bool,
    is_layer_context: bool,
    transparency_layer_count: u32,
    color_space: Cell<Option<ColorSpace>>,

    /// Caches "the user-to-device transform is known to be the identity".
    /// Invalidated whenever the CTM can have changed underneath it.
    pub(crate) user_to_device_identity: Cell<bool>,
    pub(crate) subimage_cache: SubimageCache<C>,
    pub(crate) main_thread_queue: Option<MainThreadQueue>,
    pub(crate) has_drawn: bool,
    pub(crate) max_edr_headroom: Option<f32>,
    max_painted_headroom: f32,
}

impl<C: BackendContext> GraphicsContext<C> {
    /// Wraps a backend context.
    pub fn new(backend: C) -> Self {
        Self::with_backend(Some(backend), false)
    }

    /// Wraps the backend context of a compositing layer.
    ///
    /// Layer contexts of unknown type are assumed accelerated, since that is
    /// where layers come from.
    pub fn new_for_layer(backend: C) -> Self {
        Self::with_backend(Some(backend), true)
    }

    /// Creates a context with no backend. Every operation is a no-op.
    pub fn detached() -> Self {
        Self::with_backend(None, false)
    }

    fn with_backend(backend: Option<C>, is_layer_context: bool) -> Self {
        let rendering_mode = match backend.as_ref().map(|b| b.context_type()) {
            Some(ContextType::Surface) => RenderingMode::Accelerated,
            Some(ContextType::Pdf) => RenderingMode::PdfDocument,
            Some(ContextType::Layer) | Some(ContextType::Unknown) if is_layer_context => {
                RenderingMode::Accelerated
            }
            _ => RenderingMode::Unaccelerated,
        };

        // Everything except a plain raster bitmap applies drawing lazily.
        let is_deferred = !matches!(
            backend.as_ref().map(|b| b.context_type()),
            Some(ContextType::Bitmap)
        );

        let mut stack = TinyVec::new();
        stack.push(StackEntry::default());

        let mut this = Self {
            backend,
            stack,
            rendering_mode,
            is_deferred,
            is_layer_context,
            transparency_layer_count: 0,
            color_space: Cell::new(None),
            user_to_device_identity: Cell::new(false),
            subimage_cache: SubimageCache::new(),
            main_thread_queue: None,
            has_drawn: false,
            max_edr_headroom: None,
            max_painted_headroom: SDR_HEADROOM,
        };

        // Push the whole initial state so the backend and the mirror agree.
        this.did_update_state(StateChangeFlags::all());
        this
    }

    /// Installs the queue that pattern teardown posts image releases to.
    pub fn with_main_thread_queue(mut self, queue: MainThreadQueue) -> Self {
        self.main_thread_queue = Some(queue);
        self
    }

    // Introspection.

    /// Whether a live backend is attached.
    pub fn has_platform_context(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&C> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut C> {
        self.backend.as_mut()
    }

    /// Takes the backend out, neutering the context.
    pub fn release_backend(&mut self) -> Option<C> {
        self.backend.take()
    }

    pub fn rendering_mode(&self) -> RenderingMode {
        self.rendering_mode
    }

    pub fn is_layer_context(&self) -> bool {
        self.is_layer_context
    }

    /// Whether drawing is recorded and applied later rather than rasterized
    /// immediately. Fixed at construction.
    pub fn is_deferred(&self) -> bool {
        self.is_deferred
    }

    /// The surface's color space, queried once and cached. Falls back to
    /// sRGB when the backend does not know.
    pub fn color_space(&self) -> ColorSpace {
        if let Some(space) = self.color_space.get() {
            return space;
        }
        let space = self
            .backend
            .as_ref()
            .and_then(|b| b.color_space())
            .unwrap_or_default();
        self.color_space.set(Some(space));
        space
    }

    /// Whether the backing store is known to hold float components, which
    /// preserves out-of-range color values.
    pub fn known_to_have_float_based_backing(&self) -> bool {
        self.backend
            .as_ref()
            .map_or(false, |b| b.bitmap_has_float_components())
    }

    /// Whether anything has been painted since construction.
    pub fn has_drawn(&self) -> bool {
        self.has_drawn
    }

    /// Reads and resets the has-drawn flag.
    pub fn consume_has_drawn(&mut self) -> bool {
        std::mem::take(&mut self.has_drawn)
    }

    /// Caps the headroom image draws may reach. `None` removes the cap.
    pub fn set_max_edr_headroom(&mut self, headroom: Option<f32>) {
        self.max_edr_headroom = headroom;
    }

    /// The highest headroom above SDR white painted so far.
    pub fn max_painted_edr_headroom(&self) -> f32 {
        self.max_painted_headroom
    }

    pub fn is_in_transparency_layer(&self) -> bool {
        self.transparency_layer_count > 0
    }

    // State stack.

    pub(crate) fn current(&self) -> &GraphicsContextState<C> {
        &self.stack.last().expect("state stack is never empty").state
    }

    pub(crate) fn current_mut(&mut self) -> &mut GraphicsContextState<C> {
        &mut self
            .stack
            .last_mut()
            .expect("state stack is never empty")
            .state
    }

    /// A read-only view of the mirrored state.
    pub fn state(&self) -> &GraphicsContextState<C> {
        self.current()
    }

    pub fn save(&mut self) {
        self.save_purpose(StatePurpose::SaveRestore);
    }

    pub fn restore(&mut self) {
        self.restore_purpose(StatePurpose::SaveRestore);
    }

    pub(crate) fn save_purpose(&mut self, purpose: StatePurpose) {
        let entry = StackEntry {
            state: self.current().clone(),
            purpose,
        };
        self.stack.push(entry);
        if let Some(backend) = self.backend.as_mut() {
            backend.save_gstate();
        }
    }

    pub(crate) fn restore_purpose(&mut self, purpose: StatePurpose) {
        if self.stack.len() <= 1 {
            tracing::error!("restore without a matching save");
            return;
        }
        let entry = self.stack.pop().expect("checked above");
        if entry.purpose != purpose {
            tracing::warn!(?entry.purpose, ?purpose, "unbalanced save/restore purpose");
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.restore_gstate();
        }
        self.user_to_device_identity.set(false);
    }

    /// Flushes the named pieces of the mirrored state into the backend.
    pub(crate) fn did_update_state(&mut self, changes: StateChangeFlags) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let state = &self.stack.last().expect("state stack is never empty").state;

        if changes.contains(StateChangeFlags::FILL_BRUSH) {
            backend.set_fill_color(state.fill_brush.color());
        }
        if changes.contains(StateChangeFlags::STROKE_BRUSH) {
            backend.set_stroke_color(state.stroke_brush.color());
        }
        if changes.contains(StateChangeFlags::STROKE_THICKNESS) {
            backend.set_line_width(state.stroke_thickness.max(0.0));
        }
        if changes.contains(StateChangeFlags::COMPOSITE_MODE) {
            backend.set_blend_mode(style::select_blend_mode(
                state.composite_operator,
                state.blend_mode,
            ));
        }
        if changes.intersects(StateChangeFlags::DROP_SHADOW | StateChangeFlags::STYLE) {
            let user_to_base = if state.shadows_ignore_transforms {
                Affine::IDENTITY
            } else {
                style::user_to_base_ctm(backend.ctm(), backend.base_ctm())
            };
            backend.set_style(
                state
                    .style
                    .as_ref()
                    .and_then(|s| style::backend_style(s, user_to_base)),
            );
        }
        if changes.contains(StateChangeFlags::ALPHA) {
            backend.set_alpha(state.alpha);
        }
        if changes.contains(StateChangeFlags::IMAGE_INTERPOLATION_QUALITY) {
            backend.set_interpolation_quality(state.image_interpolation_quality);
        }
        if changes.contains(StateChangeFlags::TEXT_DRAWING_MODE) {
            backend.set_text_drawing_mode(style::backend_text_drawing_mode(
                state.text_drawing_mode,
            ));
        }
        if changes.contains(StateChangeFlags::SHOULD_ANTIALIAS) {
            backend.set_should_antialias(state.should_antialias);
        }
        if changes.contains(StateChangeFlags::SHOULD_SMOOTH_FONTS) {
            backend.set_should_smooth_fonts(state.should_smooth_fonts);
        }
    }

    // Fill and stroke sources.

    pub fn set_fill_color(&mut self, color: Color) {
        self.current_mut().fill_brush.set_color(color);
        self.did_update_state(StateChangeFlags::FILL_BRUSH);
    }

    pub fn set_fill_gradient(&mut self, gradient: std::rc::Rc<Gradient>, space_transform: Affine) {
        self.current_mut()
            .fill_brush
            .set_gradient(gradient, space_transform);
        self.did_update_state(StateChangeFlags::FILL_BRUSH);
    }

    pub fn set_fill_pattern(&mut self, pattern: std::rc::Rc<TilePattern<C>>) {
        self.current_mut().fill_brush.set_pattern(pattern);
        self.did_update_state(StateChangeFlags::FILL_BRUSH);
    }

    pub fn set_fill_rule(&mut self, rule: WindRule) {
        self.current_mut().fill_rule = rule;
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        self.current_mut().stroke_brush.set_color(color);
        self.did_update_state(StateChangeFlags::STROKE_BRUSH);
    }

    pub fn set_stroke_gradient(
        &mut self,
        gradient: std::rc::Rc<Gradient>,
        space_transform: Affine,
    ) {
        self.current_mut()
            .stroke_brush
            .set_gradient(gradient, space_transform);
        self.did_update_state(StateChangeFlags::STROKE_BRUSH);
    }

    pub fn set_stroke_pattern(&mut self, pattern: std::rc::Rc<TilePattern<C>>) {
        self.current_mut().stroke_brush.set_pattern(pattern);
        self.did_update_state(StateChangeFlags::STROKE_BRUSH);
    }

    pub fn set_stroke_thickness(&mut self, thickness: f64) {
        self.current_mut().stroke_thickness = thickness;
        self.did_update_state(StateChangeFlags::STROKE_THICKNESS);
    }

    pub fn set_stroke_style(&mut self, stroke_style: StrokeStyle) {
        self.current_mut().stroke_style = stroke_style;
    }

    // Compositing.

    pub fn set_composite_mode(&mut self, operator: CompositeOperator, blend_mode: BlendMode) {
        let state = self.current_mut();
        state.composite_operator = operator;
        state.blend_mode = blend_mode;
        self.did_update_state(StateChangeFlags::COMPOSITE_MODE);
    }

    pub fn set_composite_operator(&mut self, operator: CompositeOperator) {
        self.set_composite_mode(operator, BlendMode::Normal);
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.current_mut().alpha = alpha;
        self.did_update_state(StateChangeFlags::ALPHA);
    }

    // Styles and shadows.

    pub fn set_style(&mut self, graphics_style: Option<GraphicsStyle>) {
        self.current_mut().style = graphics_style;
        self.did_update_state(StateChangeFlags::STYLE);
    }

    pub fn set_drop_shadow(&mut self, shadow: DropShadow) {
        self.current_mut().style = Some(GraphicsStyle::DropShadow(shadow));
        self.did_update_state(StateChangeFlags::DROP_SHADOW);
    }

    pub fn clear_drop_shadow(&mut self) {
        self.current_mut().style = None;
        self.did_update_state(StateChangeFlags::DROP_SHADOW);
    }

    /// When set, shadow offsets and blur radii are taken as base-space
    /// values and no longer travel through the CTM.
    pub fn set_shadows_ignore_transforms(&mut self, ignore: bool) {
        self.current_mut().shadows_ignore_transforms = ignore;
        self.did_update_state(StateChangeFlags::DROP_SHADOW);
    }

    // Quality and text.

    pub fn set_image_interpolation_quality(&mut self, quality: InterpolationQuality) {
        self.current_mut().image_interpolation_quality = quality;
        self.did_update_state(StateChangeFlags::IMAGE_INTERPOLATION_QUALITY);
    }

    pub fn set_text_drawing_mode(&mut self, mode: TextDrawingModeFlags) {
        self.current_mut().text_drawing_mode = mode;
        self.did_update_state(StateChangeFlags::TEXT_DRAWING_MODE);
    }

    pub fn set_should_antialias(&mut self, antialias: bool) {
        self.current_mut().should_antialias = antialias;
        self.did_update_state(StateChangeFlags::SHOULD_ANTIALIAS);
    }

    pub fn set_should_smooth_fonts(&mut self, smooth: bool) {
        self.current_mut().should_smooth_fonts = smooth;
        self.did_update_state(StateChangeFlags::SHOULD_SMOOTH_FONTS);
    }

    // Line attributes not mirrored on the state; the backend's gstate stack
    // already scopes them correctly.

    pub fn set_line_cap(&mut self, cap: LineCap) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_line_cap(cap);
        }
    }

    pub fn set_line_join(&mut self, join: LineJoin) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_line_join(join);
        }
    }

    pub fn set_miter_limit(&mut self, limit: f64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_miter_limit(limit);
        }
    }

    /// Sets the dash pattern. A negative offset is folded into `0..total`
    /// so backends that reject negative phases still dash correctly.
    pub fn set_line_dash(&mut self, offset: f64, dashes: &[f64]) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let total: f64 = dashes.iter().sum();
        let offset = if offset < 0.0 && total > 0.0 {
            (offset % total) + total
        } else {
            offset
        };
        backend.set_line_dash(offset, dashes);
    }

    // Transform.

    pub fn ctm(&self) -> Affine {
        self.ctm_with_scale(IncludeDeviceScale::Possibly)
    }

    /// The CTM, with the device scale folded in on request.
    pub fn ctm_with_scale(&self, include_scale: IncludeDeviceScale) -> Affine {
        let Some(backend) = self.backend.as_ref() else {
            return Affine::IDENTITY;
        };
        match include_scale {
            IncludeDeviceScale::Possibly => backend.ctm(),
            IncludeDeviceScale::Definitely => backend.user_to_device_transform(),
        }
    }

    pub fn set_ctm(&mut self, transform: Affine) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_ctm(transform);
            self.user_to_device_identity.set(false);
        }
    }

    pub fn concat_ctm(&mut self, transform: Affine) {
        if let Some(backend) = self.backend.as_mut() {
            backend.concat_ctm(transform);
            self.user_to_device_identity.set(false);
        }
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.translate_ctm(x, y);
            self.user_to_device_identity.set(false);
        }
    }

    pub fn scale(&mut self, x: f64, y: f64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.scale_ctm(x, y);
            self.user_to_device_identity.set(false);
        }
    }

    pub fn rotate(&mut self, angle: f64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.rotate_ctm(angle);
            self.user_to_device_identity.set(false);
        }
    }

    /// Folds a device scale factor into both the CTM and the base transform,
    /// so device-space consumers such as shadows and patterns see it too.
    pub fn apply_device_scale_factor(&mut self, factor: f64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.scale_ctm(factor, factor);
            let base = backend.base_ctm();
            backend.set_base_ctm(base * Affine::scale(factor));
            self.user_to_device_identity.set(false);
        }
    }

    /// Snaps a rect to device pixel boundaries under the current transform.
    pub fn round_to_device_pixels(&self, rect: Rect) -> Rect {
        let Some(backend) = self.backend.as_ref() else {
            return rect;
        };
        if self.user_to_device_identity.get() {
            return rect.round();
        }
        let transform = backend.user_to_device_transform();
        if geometry::is_identity(transform) {
            self.user_to_device_identity.set(true);
            return rect.round();
        }
        geometry::round_to_device_pixels_non_identity(transform, rect)
    }

    // Clipping.

    pub fn clip_to_rect(&mut self, rect: Rect) {
        if let Some(backend) = self.backend.as_mut() {
            backend.clip_to_rect(rect);
        }
    }

    pub fn clip_path(&mut self, path: &BezPath, rule: WindRule) {
        if let Some(backend) = self.backend.as_mut() {
            if path.elements().is_empty() {
                // An empty clip path clips everything away.
                backend.clip_to_rect(Rect::ZERO);
                return;
            }
            backend.begin_path();
            backend.add_path(path);
            match rule {
                WindRule::NonZero => backend.clip(),
                WindRule::EvenOdd => backend.eo_clip(),
            }
        }
    }

    pub fn clip_rounded_rect(&mut self, rounded: &RoundedRect) {
        if rounded.radii.is_zero() {
            self.clip_to_rect(rounded.rect);
            return;
        }
        let mut path = BezPath::new();
        geometry::add_rounded_rect(&mut path, rounded);
        self.clip_path(&path, WindRule::NonZero);
    }

    /// Clips to everything outside `rect`.
    pub fn clip_out(&mut self, rect: Rect) {
        let bounds = self.clip_out_bounds();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.begin_path();
        backend.add_rects(&[bounds, rect]);
        backend.eo_clip();
    }

    /// Clips to everything outside `path`.
    pub fn clip_out_path(&mut self, path: &BezPath) {
        // Unlike `clip_out`, the path variant always bounds the even-odd fill
        // with the current clip box rather than the infinite rect.
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let bounds = backend.clip_bounding_box();
        backend.begin_path();
        backend.add_rect(bounds);
        backend.add_path(path);
        backend.eo_clip();
    }

    pub fn clip_out_rounded_rect(&mut self, rounded: &RoundedRect) {
        if rounded.radii.is_zero() {
            self.clip_out(rounded.rect);
            return;
        }
        let mut path = BezPath::new();
        geometry::add_rounded_rect(&mut path, rounded);
        self.clip_out_path(&path);
    }

    /// The rect that stands in for "the whole plane" in inverted clips.
    ///
    /// The infinite rect breaks under rotated CTMs on accelerated surfaces
    /// and inside PDF contexts, where the clip bounding box is used instead.
    fn clip_out_bounds(&self) -> Rect {
        let Some(backend) = self.backend.as_ref() else {
            return Rect::ZERO;
        };
        let can_use_infinite_rect = self.rendering_mode != RenderingMode::PdfDocument
            && (self.rendering_mode == RenderingMode::Unaccelerated
                || !geometry::is_rotate_or_shear(backend.ctm()));
        if can_use_infinite_rect {
            INFINITE_RECT
        } else {
            backend.clip_bounding_box()
        }
    }

    /// Clips to an image used as an alpha mask over `rect`.
    ///
    /// Image space has a top-left origin, so the mask is applied under a
    /// flipped transform and the CTM is put back afterwards.
    pub fn clip_to_image_mask(&mut self, rect: Rect, image: &NativeImage<C>) {
        if let Some(backend) = self.backend.as_mut() {
            let local = Rect::from_origin_size(Point::ZERO, rect.size());
            backend.translate_ctm(rect.x0, rect.y1);
            backend.scale_ctm(1.0, -1.0);
            backend.clip_to_rect(local);
            backend.clip_to_image_mask(local, image.handle());
            backend.scale_ctm(1.0, -1.0);
            backend.translate_ctm(-rect.x0, -rect.y1);
        }
    }

    /// Drops every clip installed since the backend was created.
    pub fn reset_clip(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.reset_clip();
        }
    }

    pub fn clip_bounding_box(&self) -> Rect {
        self.backend
            .as_ref()
            .map(|b| b.clip_bounding_box())
            .unwrap_or(Rect::ZERO)
    }

    // Transparency layers.

    /// Opens a transparency layer that composites with `opacity` when the
    /// matching [`end_transparency_layer`](Self::end_transparency_layer)
    /// closes it.
    pub fn begin_transparency_layer(&mut self, opacity: f64) {
        self.save_purpose(StatePurpose::TransparencyLayer);
        self.transparency_layer_count += 1;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_alpha(opacity);
            backend.begin_transparency_layer();
        }
        self.user_to_device_identity.set(false);

        // Inside the layer, drawing starts from neutral alpha and no shadow.
        let state = self.current_mut();
        state.alpha = 1.0;
        state.style = None;
    }

    /// Opens a transparency layer that composites with the given mode. The
    /// current global alpha is preserved across the layer.
    pub fn begin_transparency_layer_with_composite(
        &mut self,
        operator: CompositeOperator,
        blend_mode: BlendMode,
    ) {
        let alpha = self.current().alpha;
        self.set_composite_mode(operator, blend_mode);
        self.begin_transparency_layer(alpha);
    }

    pub fn end_transparency_layer(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.end_transparency_layer();
        }
        self.restore_purpose(StatePurpose::TransparencyLayer);
        self.transparency_layer_count = self.transparency_layer_count.saturating_sub(1);
    }

    // Document metadata. Rects are clipped and handed over in device space.

    /// Whether named destinations and intra-document links are honored.
    pub fn supports_internal_links(&self) -> bool {
        true
    }

    pub fn set_url_for_rect(&mut self, url: &str, rect: Rect) {
        if let Some(backend) = self.backend.as_mut() {
            let clipped = rect.intersect(backend.clip_bounding_box());
            if geometry::rect_is_empty(clipped) {
                return;
            }
            let device_rect = backend.ctm().transform_rect_bbox(clipped);
            backend.set_url_for_rect(url, device_rect);
        }
    }

    pub fn set_destination_for_rect(&mut self, name: &str, rect: Rect) {
        if let Some(backend) = self.backend.as_mut() {
            let clipped = rect.intersect(backend.clip_bounding_box());
            let device_rect = backend.ctm().transform_rect_bbox(clipped);
            backend.set_destination_for_rect(name, device_rect);
        }
    }

    pub fn add_destination_at_point(&mut self, name: &str, point: Point) {
        if let Some(backend) = self.backend.as_mut() {
            let device_point = backend.ctm() * point;
            backend.add_destination_at_point(name, device_point);
        }
    }

    pub fn begin_page(&mut self, media_box: Rect) {
        if let Some(backend) = self.backend.as_mut() {
            if backend.context_type() != ContextType::Pdf {
                tracing::warn!("begin_page on a non-PDF context");
                return;
            }
            backend.begin_page(media_box);
        }
    }

    pub fn end_page(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if backend.context_type() != ContextType::Pdf {
                tracing::warn!("end_page on a non-PDF context");
                return;
            }
            backend.end_page();
        }
    }

    // Bookkeeping shared by the paint operations.

    pub(crate) fn mark_drawn(&mut self) {
        self.has_drawn = true;
    }

    pub(crate) fn record_painted_headroom(&mut self, headroom: f32) {
        if headroom > self.max_painted_headroom {
            self.max_painted_headroom = headroom;
        }
    }
}
