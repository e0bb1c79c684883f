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

//! Defines the platform 2D context the adapter mirrors its state into.

use piet::kurbo::{Affine, BezPath, Point, Rect, Size, Vec2};
use piet::Color;

use crate::brush::Gradient;
use crate::state::InterpolationQuality;

/// A pattern cell drawing callback.
///
/// Invoked by the backend once per painted cell; may be dropped on any thread,
/// which is why everything it captures must be `Send`.
pub type PatternDraw<C> = Box<dyn Fn(&mut C) + Send>;

/// The platform 2D drawing context wrapped by [`GraphicsContext`].
///
/// The adapter owns exactly one value of this type for its whole lifetime and
/// assumes the usual immediate-mode contract: an internal graphics state that
/// saves and restores as a stack, a current transformation matrix, a current
/// path, and a current clip.
///
/// [`GraphicsContext`]: crate::GraphicsContext
pub trait BackendContext {
    /// A decoded platform image.
    ///
    /// Handles are refcounted clones of the same pixels. `Send` is required so
    /// that a pattern torn down on a foreign thread can hand the final release
    /// back to the main loop.
    type Image: Clone + Send + 'static;

    /// A tiled pattern object constructed over an image cell.
    type Pattern;

    /// An offscreen layer with a backend context of its own.
    type Layer;

    // Introspection.

    /// The flavor of surface behind this context.
    fn context_type(&self) -> ContextType;

    /// The color space the surface composites in, if known.
    fn color_space(&self) -> Option<ColorSpace>;

    /// Whether the backing store uses float components.
    fn bitmap_has_float_components(&self) -> bool;

    // Graphics state.

    fn save_gstate(&mut self);
    fn restore_gstate(&mut self);

    fn set_fill_color(&mut self, color: Color);
    fn set_stroke_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: f64);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_line_join(&mut self, join: LineJoin);
    fn set_line_dash(&mut self, offset: f64, lengths: &[f64]);
    fn set_miter_limit(&mut self, limit: f64);
    fn set_blend_mode(&mut self, mode: BackendBlendMode);
    fn set_alpha(&mut self, alpha: f64);
    fn set_interpolation_quality(&mut self, quality: InterpolationQuality);
    fn interpolation_quality(&self) -> InterpolationQuality;
    fn set_text_drawing_mode(&mut self, mode: TextDrawingMode);
    fn set_should_antialias(&mut self, antialias: bool);
    fn set_should_smooth_fonts(&mut self, smooth: bool);

    /// Installs a drawing style, or clears it with `None`.
    fn set_style(&mut self, style: Option<BackendStyle>);

    // Transform.

    fn ctm(&self) -> Affine;
    fn set_ctm(&mut self, transform: Affine);
    fn concat_ctm(&mut self, transform: Affine);
    fn translate_ctm(&mut self, x: f64, y: f64);
    fn scale_ctm(&mut self, x: f64, y: f64);
    fn rotate_ctm(&mut self, angle: f64);

    /// The base (device scale) transform beneath the CTM.
    fn base_ctm(&self) -> Affine;
    fn set_base_ctm(&mut self, transform: Affine);

    /// The full user-space-to-device-space transform.
    fn user_to_device_transform(&self) -> Affine;

    // The context path.

    fn begin_path(&mut self);
    fn move_to(&mut self, point: Point);
    fn line_to(&mut self, point: Point);
    fn add_rect(&mut self, rect: Rect);
    fn add_rects(&mut self, rects: &[Rect]);
    fn add_path(&mut self, path: &BezPath);

    /// Replaces the context path with its stroked outline under the current
    /// line attributes.
    fn replace_path_with_stroked_path(&mut self);

    /// Strokes and clears the context path.
    fn stroke_path(&mut self);

    // Direct drawing.

    /// Draws a path without disturbing the context path.
    fn draw_path(&mut self, path: &BezPath, mode: PathDrawingMode);
    fn fill_rect(&mut self, rect: Rect);
    fn fill_rects(&mut self, rects: &[Rect]);
    fn clear_rect(&mut self, rect: Rect);
    fn stroke_line_segments(&mut self, points: &[Point]);
    fn fill_ellipse_in_rect(&mut self, rect: Rect);
    fn stroke_ellipse_in_rect(&mut self, rect: Rect);

    /// Paints a gradient over the current clip, in gradient space.
    fn paint_gradient(&mut self, gradient: &Gradient);

    // Clipping.

    fn clip_to_rect(&mut self, rect: Rect);

    /// Intersects the clip with the context path, nonzero winding.
    fn clip(&mut self);

    /// Intersects the clip with the context path, even-odd winding.
    fn eo_clip(&mut self);

    fn reset_clip(&mut self);
    fn clip_bounding_box(&self) -> Rect;

    /// Clips to an image used as an alpha mask over `rect`.
    fn clip_to_image_mask(&mut self, rect: Rect, image: &Self::Image);

    // Images.

    /// The logical pixel size of an image.
    fn image_size(&self, image: &Self::Image) -> Size;

    /// The currently decoded extent, which trails [`image_size`] while a
    /// progressive decode is still running.
    ///
    /// [`image_size`]: Self::image_size
    fn decoded_image_size(&self, image: &Self::Image) -> Size {
        self.image_size(image)
    }

    fn create_subimage(&mut self, image: &Self::Image, rect: Rect) -> Option<Self::Image>;
    fn draw_image(&mut self, rect: Rect, image: &Self::Image);
    fn draw_tiled_image(&mut self, rect: Rect, image: &Self::Image);

    // Patterns.

    fn create_pattern(
        &mut self,
        bounds: Rect,
        matrix: Affine,
        x_step: f64,
        y_step: f64,
        draw: PatternDraw<Self>,
    ) -> Option<Self::Pattern>
    where
        Self: Sized;

    fn set_fill_pattern(&mut self, pattern: &Self::Pattern, alpha: f64);
    fn set_stroke_pattern(&mut self, pattern: &Self::Pattern, alpha: f64);
    fn set_pattern_phase(&mut self, phase: Vec2);

    // Transparency and compositing layers.

    fn begin_transparency_layer(&mut self);
    fn end_transparency_layer(&mut self);

    fn create_layer(&mut self, size: Size) -> Option<Self::Layer>;

    /// The drawing context of an offscreen layer.
    fn layer_context(layer: &mut Self::Layer) -> &mut Self
    where
        Self: Sized;

    fn draw_layer_in_rect(&mut self, rect: Rect, layer: &Self::Layer);

    // Document metadata, honored by PDF-backed contexts.

    fn set_url_for_rect(&mut self, url: &str, rect: Rect);
    fn set_destination_for_rect(&mut self, name: &str, rect: Rect);
    fn add_destination_at_point(&mut self, name: &str, point: Point);
    fn begin_page(&mut self, media_box: Rect);
    fn end_page(&mut self);

    // High dynamic range. Contexts without HDR support keep the defaults.

    fn edr_target_headroom(&self) -> f32 {
        1.0
    }

    fn set_edr_target_headroom(&mut self, _headroom: f32) {}

    fn content_tone_mapping_info(&self) -> Option<ToneMappingInfo> {
        None
    }

    fn set_content_tone_mapping_info(&mut self, _info: Option<ToneMappingInfo>) {}
}

/// The flavor of surface behind a backend context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextType {
    /// A raster bitmap in main memory.
    Bitmap,

    /// A GPU-shareable surface.
    Surface,

    /// A PDF recording context.
    Pdf,

    /// An offscreen compositing layer.
    Layer,

    Unknown,
}

/// Destination color spaces the adapter can translate colors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ColorSpace {
    #[default]
    Srgb,
    DisplayP3,
    ExtendedSrgb,
    LinearSrgb,
}

/// How a path draw combines filling and stroking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDrawingMode {
    Fill,
    EoFill,
    Stroke,
    FillStroke,
    EoFillStroke,
}

/// Backend blend modes, the union of composite operators and separable and
/// non-separable blend functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendBlendMode {
    Clear,
    Copy,
    Normal,
    SourceIn,
    SourceOut,
    SourceAtop,
    DestinationOver,
    DestinationIn,
    DestinationOut,
    DestinationAtop,
    Xor,
    PlusDarker,
    PlusLighter,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

/// A style applied to subsequent drawing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendStyle {
    /// An offset, blurred, colored copy drawn beneath each primitive.
    Shadow {
        offset: Vec2,
        blur_radius: f64,
        color: Color,
    },

    /// An isotropic Gaussian blur of each primitive.
    GaussianBlur { normalization: f32, radius: f64 },

    /// A 4x5 row-major color matrix applied to each primitive.
    ColorMatrix([f32; 20]),
}

/// How text is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDrawingMode {
    Fill,
    Stroke,
    FillStroke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// Tone mapping parameters installed while drawing HDR image content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneMappingInfo {
    pub edr_strength: f32,
    pub content_average_light_level: f32,
    pub constrained_dynamic_range_strength: f32,
}
