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

//! Translation of compositing and style state into backend terms.

use piet::kurbo::Affine;

use crate::backend::{BackendBlendMode, BackendStyle, TextDrawingMode};
use crate::state::{BlendMode, CompositeOperator, GraphicsStyle, TextDrawingModeFlags};

/// Collapses the composite operator and blend mode pair into the single
/// blend mode backends speak.
///
/// A blend mode other than normal wins outright; the operator only decides
/// the result when the blend mode is normal.
pub(crate) fn select_blend_mode(
    operator: CompositeOperator,
    blend_mode: BlendMode,
) -> BackendBlendMode {
    match blend_mode {
        BlendMode::Normal => match operator {
            CompositeOperator::Clear => BackendBlendMode::Clear,
            CompositeOperator::Copy => BackendBlendMode::Copy,
            CompositeOperator::SourceOver => BackendBlendMode::Normal,
            CompositeOperator::SourceIn => BackendBlendMode::SourceIn,
            CompositeOperator::SourceOut => BackendBlendMode::SourceOut,
            CompositeOperator::SourceAtop => BackendBlendMode::SourceAtop,
            CompositeOperator::DestinationOver => BackendBlendMode::DestinationOver,
            CompositeOperator::DestinationIn => BackendBlendMode::DestinationIn,
            CompositeOperator::DestinationOut => BackendBlendMode::DestinationOut,
            CompositeOperator::DestinationAtop => BackendBlendMode::DestinationAtop,
            CompositeOperator::Xor => BackendBlendMode::Xor,
            CompositeOperator::PlusDarker => BackendBlendMode::PlusDarker,
            CompositeOperator::PlusLighter => BackendBlendMode::PlusLighter,
            CompositeOperator::Difference => BackendBlendMode::Difference,
        },
        BlendMode::Multiply => BackendBlendMode::Multiply,
        BlendMode::Screen => BackendBlendMode::Screen,
        BlendMode::Overlay => BackendBlendMode::Overlay,
        BlendMode::Darken => BackendBlendMode::Darken,
        BlendMode::Lighten => BackendBlendMode::Lighten,
        BlendMode::ColorDodge => BackendBlendMode::ColorDodge,
        BlendMode::ColorBurn => BackendBlendMode::ColorBurn,
        BlendMode::HardLight => BackendBlendMode::HardLight,
        BlendMode::SoftLight => BackendBlendMode::SoftLight,
        BlendMode::Difference => BackendBlendMode::Difference,
        BlendMode::Exclusion => BackendBlendMode::Exclusion,
        BlendMode::Hue => BackendBlendMode::Hue,
        BlendMode::Saturation => BackendBlendMode::Saturation,
        BlendMode::Color => BackendBlendMode::Color,
        BlendMode::Luminosity => BackendBlendMode::Luminosity,
        BlendMode::PlusDarker => BackendBlendMode::PlusDarker,
        BlendMode::PlusLighter => BackendBlendMode::PlusLighter,
    }
}

const MAX_BLUR_RADIUS: f64 = 1000.0;

/// Scales a blur radius into device space.
///
/// Uses the smaller singular value of the transform's linear part, so an
/// anisotropic scale never over-blurs along the tighter axis.
pub(crate) fn scaled_blur_radius(transform: Affine, radius: f64) -> f64 {
    let [a, b, c, d, _, _] = transform.as_coeffs();
    let aa = a * a + b * b;
    let bc = a * c + b * d;
    let dd = c * c + d * d;
    let discriminant = (4.0 * bc * bc + (aa - dd) * (aa - dd)).sqrt();
    let small_eigenvalue = (0.5 * ((aa + dd) - discriminant)).max(0.0).sqrt();
    (radius * small_eigenvalue).min(MAX_BLUR_RADIUS)
}

/// Converts the mirrored style to the backend's vocabulary.
///
/// Shadow offsets and blur radii are specified in user space but applied by
/// the backend in base space, so they travel through `user_to_base`. A shadow
/// with no offset and no blur clears the style outright.
pub(crate) fn backend_style(style: &GraphicsStyle, user_to_base: Affine) -> Option<BackendStyle> {
    match *style {
        GraphicsStyle::DropShadow(shadow) => {
            if shadow.offset == piet::kurbo::Vec2::ZERO && shadow.radius == 0.0 {
                return None;
            }
            let [a, b, c, d, _, _] = user_to_base.as_coeffs();
            let offset = piet::kurbo::Vec2::new(
                a * shadow.offset.x + c * shadow.offset.y,
                b * shadow.offset.x + d * shadow.offset.y,
            );
            Some(BackendStyle::Shadow {
                offset,
                blur_radius: scaled_blur_radius(user_to_base, shadow.radius),
                color: shadow.color.with_alpha(shadow.opacity),
            })
        }
        GraphicsStyle::GaussianBlur { radius } => Some(BackendStyle::GaussianBlur {
            normalization: 1.0,
            radius: scaled_blur_radius(user_to_base, radius),
        }),
        GraphicsStyle::ColorMatrix(matrix) => Some(BackendStyle::ColorMatrix(matrix)),
    }
}

/// Collapses the fill/stroke flags to the backend's three-valued mode.
///
/// An empty set falls back to stroking, which draws nothing visible for
/// zero-thickness strokes while keeping the glyph machinery running.
pub(crate) fn backend_text_drawing_mode(flags: TextDrawingModeFlags) -> TextDrawingMode {
    let fill = flags.contains(TextDrawingModeFlags::FILL);
    let stroke = flags.contains(TextDrawingModeFlags::STROKE);
    match (fill, stroke) {
        (true, true) => TextDrawingMode::FillStroke,
        (true, false) => TextDrawingMode::Fill,
        _ => TextDrawingMode::Stroke,
    }
}

/// The transform from user space to the backend's base space, which is
/// where pattern phases and shadow offsets are interpreted.
pub(crate) fn user_to_base_ctm(ctm: Affine, base_ctm: Affine) -> Affine {
    base_ctm.inverse() * ctm
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_OPERATORS: [CompositeOperator; 14] = [
        CompositeOperator::Clear,
        CompositeOperator::Copy,
        CompositeOperator::SourceOver,
        CompositeOperator::SourceIn,
        CompositeOperator::SourceOut,
        CompositeOperator::SourceAtop,
        CompositeOperator::DestinationOver,
        CompositeOperator::DestinationIn,
        CompositeOperator::DestinationOut,
        CompositeOperator::DestinationAtop,
        CompositeOperator::Xor,
        CompositeOperator::PlusDarker,
        CompositeOperator::PlusLighter,
        CompositeOperator::Difference,
    ];

    #[test]
    fn blend_mode_wins_for_every_operator() {
        let blends = [
            (BlendMode::Multiply, BackendBlendMode::Multiply),
            (BlendMode::Screen, BackendBlendMode::Screen),
            (BlendMode::Overlay, BackendBlendMode::Overlay),
            (BlendMode::Darken, BackendBlendMode::Darken),
            (BlendMode::Lighten, BackendBlendMode::Lighten),
            (BlendMode::ColorDodge, BackendBlendMode::ColorDodge),
            (BlendMode::ColorBurn, BackendBlendMode::ColorBurn),
            (BlendMode::HardLight, BackendBlendMode::HardLight),
            (BlendMode::SoftLight, BackendBlendMode::SoftLight),
            (BlendMode::Difference, BackendBlendMode::Difference),
            (BlendMode::Exclusion, BackendBlendMode::Exclusion),
            (BlendMode::Hue, BackendBlendMode::Hue),
            (BlendMode::Saturation, BackendBlendMode::Saturation),
            (BlendMode::Color, BackendBlendMode::Color),
            (BlendMode::Luminosity, BackendBlendMode::Luminosity),
            (BlendMode::PlusDarker, BackendBlendMode::PlusDarker),
            (BlendMode::PlusLighter, BackendBlendMode::PlusLighter),
        ];
        for operator in ALL_OPERATORS {
            for (blend, expected) in blends {
                assert_eq!(select_blend_mode(operator, blend), expected);
            }
        }
    }

    #[test]
    fn normal_blend_falls_back_to_the_operator() {
        let table = [
            BackendBlendMode::Clear,
            BackendBlendMode::Copy,
            BackendBlendMode::Normal,
            BackendBlendMode::SourceIn,
            BackendBlendMode::SourceOut,
            BackendBlendMode::SourceAtop,
            BackendBlendMode::DestinationOver,
            BackendBlendMode::DestinationIn,
            BackendBlendMode::DestinationOut,
            BackendBlendMode::DestinationAtop,
            BackendBlendMode::Xor,
            BackendBlendMode::PlusDarker,
            BackendBlendMode::PlusLighter,
            BackendBlendMode::Difference,
        ];
        for (operator, expected) in ALL_OPERATORS.into_iter().zip(table) {
            assert_eq!(select_blend_mode(operator, BlendMode::Normal), expected);
        }
    }

    #[test]
    fn shadow_offsets_scale_through_the_base_transform() {
        use crate::state::DropShadow;
        use piet::kurbo::Vec2;
        use piet::Color;

        let style = GraphicsStyle::DropShadow(DropShadow {
            color: Color::BLACK,
            offset: Vec2::new(2.0, 3.0),
            radius: 4.0,
            opacity: 1.0,
        });
        assert_eq!(
            backend_style(&style, Affine::scale(2.0)),
            Some(BackendStyle::Shadow {
                offset: Vec2::new(4.0, 6.0),
                blur_radius: 8.0,
                color: Color::BLACK.with_alpha(1.0),
            })
        );
        // An identity transform leaves the user-space values untouched.
        assert_eq!(
            backend_style(&style, Affine::IDENTITY),
            Some(BackendStyle::Shadow {
                offset: Vec2::new(2.0, 3.0),
                blur_radius: 4.0,
                color: Color::BLACK.with_alpha(1.0),
            })
        );
    }

    #[test]
    fn blur_radius_tracks_uniform_scale() {
        let scaled = scaled_blur_radius(Affine::scale(2.0), 5.0);
        assert!((scaled - 10.0).abs() < 1e-9);
    }

    #[test]
    fn blur_radius_uses_smaller_axis() {
        let scaled = scaled_blur_radius(Affine::scale_non_uniform(4.0, 0.5), 8.0);
        assert!((scaled - 4.0).abs() < 1e-9);
    }

    #[test]
    fn blur_radius_is_clamped() {
        let scaled = scaled_blur_radius(Affine::scale(1000.0), 50.0);
        assert_eq!(scaled, 1000.0);
    }

    #[test]
    fn text_mode_flags_collapse() {
        assert_eq!(
            backend_text_drawing_mode(TextDrawingModeFlags::FILL),
            TextDrawingMode::Fill
        );
        assert_eq!(
            backend_text_drawing_mode(TextDrawingModeFlags::FILL | TextDrawingModeFlags::STROKE),
            TextDrawingMode::FillStroke
        );
        assert_eq!(
            backend_text_drawing_mode(TextDrawingModeFlags::empty()),
            TextDrawingMode::Stroke
        );
    }

    #[test]
    fn user_to_base_removes_device_scale() {
        let base = Affine::scale(2.0);
        let ctm = Affine::scale(2.0) * Affine::translate((10.0, 20.0));
        let result = user_to_base_ctm(ctm, base);
        assert_eq!(result, Affine::translate((10.0, 20.0)));
    }
}
