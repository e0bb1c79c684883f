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

//! Fill and stroke sources.

use std::rc::Rc;

use piet::kurbo::{Affine, Point};
use piet::Color;

use crate::backend::BackendContext;
use crate::image::NativeImage;

/// A color ramp stop, offset in `0.0..=1.0` along the gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f64,
    pub color: Color,
}

/// The geometry of a gradient, in gradient space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientKind {
    Linear {
        start: Point,
        end: Point,
    },
    Radial {
        start: Point,
        start_radius: f64,
        end: Point,
        end_radius: f64,
    },
    Conic {
        center: Point,
        angle: f64,
    },
}

/// A gradient ramp painted by the backend over the current clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    kind: GradientKind,
    stops: Vec<GradientStop>,
}

impl Gradient {
    pub fn new(kind: GradientKind) -> Self {
        Self {
            kind,
            stops: Vec::new(),
        }
    }

    pub fn kind(&self) -> GradientKind {
        self.kind
    }

    /// Appends a stop, keeping the ramp sorted by offset.
    pub fn add_color_stop(&mut self, offset: f64, color: Color) {
        let stop = GradientStop { offset, color };
        let at = self
            .stops
            .partition_point(|existing| existing.offset <= offset);
        self.stops.insert(at, stop);
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }
}

/// An image tiled across the plane.
pub struct TilePattern<C: BackendContext> {
    pub tile_image: NativeImage<C>,
    pub repeat_x: bool,
    pub repeat_y: bool,

    /// Pattern space to user space.
    pub transform: Affine,
}

impl<C: BackendContext> Clone for TilePattern<C> {
    fn clone(&self) -> Self {
        Self {
            tile_image: self.tile_image.clone(),
            repeat_x: self.repeat_x,
            repeat_y: self.repeat_y,
            transform: self.transform,
        }
    }
}

/// A non-color source installed on a brush.
pub enum CustomBrush<C: BackendContext> {
    Gradient {
        gradient: Rc<Gradient>,

        /// Gradient space to user space.
        space_transform: Affine,
    },
    Pattern(Rc<TilePattern<C>>),
}

impl<C: BackendContext> Clone for CustomBrush<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Gradient {
                gradient,
                space_transform,
            } => Self::Gradient {
                gradient: gradient.clone(),
                space_transform: *space_transform,
            },
            Self::Pattern(pattern) => Self::Pattern(pattern.clone()),
        }
    }
}

/// The source a fill or stroke paints with.
///
/// The color survives alongside a custom source so that callers that cannot
/// honor the custom source still have something sensible to draw with.
pub struct Brush<C: BackendContext> {
    color: Color,
    custom: Option<CustomBrush<C>>,
}

impl<C: BackendContext> Brush<C> {
    pub fn color(&self) -> Color {
        self.color
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        self.custom = None;
    }

    pub fn set_gradient(&mut self, gradient: Rc<Gradient>, space_transform: Affine) {
        self.custom = Some(CustomBrush::Gradient {
            gradient,
            space_transform,
        });
    }

    pub fn set_pattern(&mut self, pattern: Rc<TilePattern<C>>) {
        self.custom = Some(CustomBrush::Pattern(pattern));
    }

    pub fn custom(&self) -> Option<&CustomBrush<C>> {
        self.custom.as_ref()
    }

    pub fn gradient(&self) -> Option<&Rc<Gradient>> {
        match &self.custom {
            Some(CustomBrush::Gradient { gradient, .. }) => Some(gradient),
            _ => None,
        }
    }

    /// The gradient's space transform, identity for other sources.
    pub fn gradient_space_transform(&self) -> Affine {
        match &self.custom {
            Some(CustomBrush::Gradient {
                space_transform, ..
            }) => *space_transform,
            _ => Affine::IDENTITY,
        }
    }

    pub fn pattern(&self) -> Option<&Rc<TilePattern<C>>> {
        match &self.custom {
            Some(CustomBrush::Pattern(pattern)) => Some(pattern),
            _ => None,
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self.custom, Some(CustomBrush::Gradient { .. }))
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self.custom, Some(CustomBrush::Pattern(_)))
    }
}

impl<C: BackendContext> Default for Brush<C> {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            custom: None,
        }
    }
}

impl<C: BackendContext> Clone for Brush<C> {
    fn clone(&self) -> Self {
        Self {
            color: self.color,
            custom: self.custom.clone(),
        }
    }
}
