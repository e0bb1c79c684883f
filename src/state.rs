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

//! The mirrored drawing state and its change tracking.

use piet::kurbo::Vec2;
use piet::Color;

use crate::backend::BackendContext;
use crate::brush::Brush;

bitflags::bitflags! {
    /// Pieces of [`GraphicsContextState`] that have changed since the last
    /// flush into the backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateChangeFlags: u16 {
        const FILL_BRUSH = 1 << 0;
        const STROKE_BRUSH = 1 << 1;
        const STROKE_THICKNESS = 1 << 2;
        const COMPOSITE_MODE = 1 << 3;
        const DROP_SHADOW = 1 << 4;
        const STYLE = 1 << 5;
        const ALPHA = 1 << 6;
        const IMAGE_INTERPOLATION_QUALITY = 1 << 7;
        const TEXT_DRAWING_MODE = 1 << 8;
        const SHOULD_ANTIALIAS = 1 << 9;
        const SHOULD_SMOOTH_FONTS = 1 << 10;
    }
}

bitflags::bitflags! {
    /// Which parts of a glyph run are painted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextDrawingModeFlags: u8 {
        const FILL = 1 << 0;
        const STROKE = 1 << 1;
    }
}

/// A Porter-Duff compositing operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOperator {
    Clear,
    Copy,
    SourceOver,
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
    Difference,
}

/// A blend function applied together with [`CompositeOperator::SourceOver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Normal,
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
    PlusDarker,
    PlusLighter,
}

/// How strokes are patterned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrokeStyle {
    NoStroke,
    Solid,
    Dotted,
    Dashed,
}

/// The winding rule used for fills and clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindRule {
    NonZero,
    EvenOdd,
}

/// How images are resampled when scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationQuality {
    Default,
    DoNotInterpolate,
    Low,
    Medium,
    High,
}

/// A drop shadow drawn beneath subsequent primitives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropShadow {
    pub color: Color,
    pub offset: Vec2,
    pub radius: f64,
    pub opacity: f64,
}

/// An optional style applied to subsequent primitives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GraphicsStyle {
    DropShadow(DropShadow),
    GaussianBlur { radius: f64 },
    ColorMatrix([f32; 20]),
}

/// Why a state stack entry was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatePurpose {
    Initial,
    SaveRestore,
    TransparencyLayer,
}

/// The full mirrored drawing state.
///
/// One of these rides on every stack entry; the adapter compares mutations
/// against it and flushes only the changed pieces into the backend.
pub struct GraphicsContextState<C: BackendContext> {
    pub fill_brush: Brush<C>,
    pub stroke_brush: Brush<C>,
    pub stroke_thickness: f64,
    pub stroke_style: StrokeStyle,
    pub fill_rule: WindRule,
    pub composite_operator: CompositeOperator,
    pub blend_mode: BlendMode,
    pub style: Option<GraphicsStyle>,

    /// Shadows cast in base space, exempt from the CTM.
    pub shadows_ignore_transforms: bool,
    pub alpha: f64,
    pub image_interpolation_quality: InterpolationQuality,
    pub text_drawing_mode: TextDrawingModeFlags,
    pub should_antialias: bool,
    pub should_smooth_fonts: bool,
}

impl<C: BackendContext> GraphicsContextState<C> {
    /// The drop shadow, if the current style is one.
    pub fn drop_shadow(&self) -> Option<DropShadow> {
        match self.style {
            Some(GraphicsStyle::DropShadow(shadow)) => Some(shadow),
            _ => None,
        }
    }

    /// Whether the shadow (or blur) could paint anything visible.
    pub fn has_visible_shadow(&self) -> bool {
        match self.style {
            Some(GraphicsStyle::DropShadow(shadow)) => {
                shadow.color != Color::TRANSPARENT
                    && (shadow.offset != Vec2::ZERO || shadow.radius != 0.0)
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Whether a blur would have to be applied with the shadow.
    pub fn has_blurred_shadow(&self) -> bool {
        match self.style {
            Some(GraphicsStyle::DropShadow(shadow)) => {
                self.has_visible_shadow() && shadow.radius != 0.0
            }
            Some(GraphicsStyle::GaussianBlur { radius }) => radius != 0.0,
            _ => false,
        }
    }
}

impl<C: BackendContext> Default for GraphicsContextState<C> {
    fn default() -> Self {
        Self {
            fill_brush: Brush::default(),
            stroke_brush: Brush::default(),
            stroke_thickness: 0.0,
            stroke_style: StrokeStyle::Solid,
            fill_rule: WindRule::NonZero,
            composite_operator: CompositeOperator::SourceOver,
            blend_mode: BlendMode::Normal,
            style: None,
            shadows_ignore_transforms: false,
            alpha: 1.0,
            image_interpolation_quality: InterpolationQuality::Default,
            text_drawing_mode: TextDrawingModeFlags::FILL,
            should_antialias: true,
            should_smooth_fonts: true,
        }
    }
}

impl<C: BackendContext> Clone for GraphicsContextState<C> {
    fn clone(&self) -> Self {
        Self {
            fill_brush: self.fill_brush.clone(),
            stroke_brush: self.stroke_brush.clone(),
            stroke_thickness: self.stroke_thickness,
            stroke_style: self.stroke_style,
            fill_rule: self.fill_rule,
            composite_operator: self.composite_operator,
            blend_mode: self.blend_mode,
            style: self.style,
            shadows_ignore_transforms: self.shadows_ignore_transforms,
            alpha: self.alpha,
            image_interpolation_quality: self.image_interpolation_quality,
            text_drawing_mode: self.text_drawing_mode,
            should_antialias: self.should_antialias,
            should_smooth_fonts: self.should_smooth_fonts,
        }
    }
}

/// One level of the adapter's state stack.
pub(crate) struct StackEntry<C: BackendContext> {
    pub(crate) state: GraphicsContextState<C>,
    pub(crate) purpose: StatePurpose,
}

impl<C: BackendContext> Default for StackEntry<C> {
    fn default() -> Self {
        Self {
            state: GraphicsContextState::default(),
            purpose: StatePurpose::Initial,
        }
    }
}

impl<C: BackendContext> Clone for StackEntry<C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            purpose: self.purpose,
        }
    }
}
