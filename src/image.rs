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

//! Decoded images, their orientation metadata, and per-image draw options.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use piet::kurbo::{Affine, Rect, Size};

use crate::backend::BackendContext;
use crate::state::{BlendMode, CompositeOperator, InterpolationQuality};

/// The EXIF orientation baked into an image's metadata.
///
/// The first word names where the row-0 side of the stored pixels lands in
/// the displayed image, the second where the column-0 side lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageOrientation {
    #[default]
    OriginTopLeft,
    OriginTopRight,
    OriginBottomRight,
    OriginBottomLeft,
    OriginLeftTop,
    OriginRightTop,
    OriginRightBottom,
    OriginLeftBottom,
}

impl ImageOrientation {
    pub fn is_default(self) -> bool {
        self == Self::OriginTopLeft
    }

    /// Whether displaying swaps the stored width and height.
    pub fn uses_width_as_height(self) -> bool {
        matches!(
            self,
            Self::OriginLeftTop
                | Self::OriginRightTop
                | Self::OriginRightBottom
                | Self::OriginLeftBottom
        )
    }

    /// The transform that maps stored pixels into their displayed placement,
    /// given the displayed size.
    pub fn transform_from_default(self, size: Size) -> Affine {
        let (w, h) = (size.width, size.height);
        match self {
            Self::OriginTopLeft => Affine::IDENTITY,
            Self::OriginTopRight => Affine::new([-1.0, 0.0, 0.0, 1.0, w, 0.0]),
            Self::OriginBottomRight => Affine::new([-1.0, 0.0, 0.0, -1.0, w, h]),
            Self::OriginBottomLeft => Affine::new([1.0, 0.0, 0.0, -1.0, 0.0, h]),
            Self::OriginLeftTop => Affine::new([0.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
            Self::OriginRightTop => Affine::new([0.0, 1.0, -1.0, 0.0, w, 0.0]),
            Self::OriginRightBottom => Affine::new([0.0, -1.0, -1.0, 0.0, w, h]),
            Self::OriginLeftBottom => Affine::new([0.0, -1.0, 1.0, 0.0, 0.0, h]),
        }
    }
}

/// The headroom above SDR white an image's pixels reach. `1.0` is SDR.
pub const SDR_HEADROOM: f32 = 1.0;

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// A decoded backend image together with the metadata drawing needs.
pub struct NativeImage<C: BackendContext> {
    handle: C::Image,
    id: u64,
    orientation: ImageOrientation,
    headroom: f32,
}

impl<C: BackendContext> NativeImage<C> {
    pub fn new(handle: C::Image) -> Self {
        Self {
            handle,
            id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
            orientation: ImageOrientation::default(),
            headroom: SDR_HEADROOM,
        }
    }

    pub fn with_orientation(mut self, orientation: ImageOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_headroom(mut self, headroom: f32) -> Self {
        self.headroom = headroom.max(SDR_HEADROOM);
        self
    }

    pub fn handle(&self) -> &C::Image {
        &self.handle
    }

    /// A process-unique identifier, stable across clones of the handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn orientation(&self) -> ImageOrientation {
        self.orientation
    }

    pub fn headroom(&self) -> f32 {
        self.headroom
    }

    pub fn has_hdr_content(&self) -> bool {
        self.headroom > SDR_HEADROOM
    }

    /// The currently decoded pixel size.
    pub fn size(&self, backend: &C) -> Size {
        backend.image_size(&self.handle)
    }
}

impl<C: BackendContext> Clone for NativeImage<C> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            id: self.id,
            orientation: self.orientation,
            headroom: self.headroom,
        }
    }
}

/// The headroom a draw should assume for its source image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Headroom {
    /// Use the headroom recorded on the image itself.
    #[default]
    FromImage,

    /// Use a caller-supplied value.
    Known(f32),
}

impl Headroom {
    pub fn resolve<C: BackendContext>(self, image: &NativeImage<C>) -> f32 {
        match self {
            Self::FromImage => image.headroom(),
            Self::Known(value) => value.max(SDR_HEADROOM),
        }
    }
}

/// How far above SDR white a draw is allowed to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicRangeLimit {
    #[default]
    NoLimit,
    Constrained,
    Standard,
}

impl DynamicRangeLimit {
    /// The limit expressed as a mix weight, `1.0` unconstrained down to
    /// `0.0` fully standard range.
    pub fn value(self) -> f32 {
        match self {
            Self::NoLimit => 1.0,
            Self::Constrained => 0.5,
            Self::Standard => 0.0,
        }
    }
}

/// Per-draw options for image painting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImagePaintingOptions {
    pub composite_operator: CompositeOperator,
    pub blend_mode: BlendMode,

    /// Overrides the image's own orientation when set.
    pub orientation: Option<ImageOrientation>,
    pub interpolation_quality: InterpolationQuality,
    pub headroom: Headroom,
    pub dynamic_range_limit: DynamicRangeLimit,

    /// Transient sources are drawn once and thrown away, so derived data
    /// such as subimages is not worth caching for them.
    pub is_transient: bool,
}

impl Default for ImagePaintingOptions {
    fn default() -> Self {
        Self {
            composite_operator: CompositeOperator::SourceOver,
            blend_mode: BlendMode::Normal,
            orientation: None,
            interpolation_quality: InterpolationQuality::Default,
            headroom: Headroom::FromImage,
            dynamic_range_limit: DynamicRangeLimit::NoLimit,
            is_transient: false,
        }
    }
}

impl ImagePaintingOptions {
    pub(crate) fn effective_orientation<C: BackendContext>(
        &self,
        image: &NativeImage<C>,
    ) -> ImageOrientation {
        self.orientation.unwrap_or_else(|| image.orientation())
    }

    pub(crate) fn draws_hdr_content<C: BackendContext>(&self, image: &NativeImage<C>) -> bool {
        self.headroom.resolve(image) > SDR_HEADROOM
    }
}

/// A subimage cache key, the source image plus the integral crop rect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SubimageKey {
    image: u64,
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl SubimageKey {
    fn new(image: u64, rect: Rect) -> Self {
        Self {
            image,
            x0: rect.x0.floor() as i64,
            y0: rect.y0.floor() as i64,
            x1: rect.x1.ceil() as i64,
            y1: rect.y1.ceil() as i64,
        }
    }
}

const SUBIMAGE_CACHE_CAPACITY: usize = 64;

/// Cropped-image handles kept around so that repeated partial draws of the
/// same source do not re-crop every frame.
pub(crate) struct SubimageCache<C: BackendContext> {
    entries: HashMap<SubimageKey, C::Image, ahash::RandomState>,
}

impl<C: BackendContext> SubimageCache<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// Crops `image` to `rect`, reusing a previous crop when possible.
    pub(crate) fn subimage(
        &mut self,
        backend: &mut C,
        image: &NativeImage<C>,
        rect: Rect,
        transient: bool,
    ) -> Option<C::Image> {
        if transient {
            return backend.create_subimage(image.handle(), rect);
        }

        let key = SubimageKey::new(image.id(), rect);
        if let Some(cached) = self.entries.get(&key) {
            return Some(cached.clone());
        }

        let subimage = backend.create_subimage(image.handle(), rect)?;
        if self.entries.len() >= SUBIMAGE_CACHE_CAPACITY {
            self.entries.clear();
        }
        self.entries.insert(key, subimage.clone());
        Some(subimage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_swaps_axes() {
        assert!(!ImageOrientation::OriginTopLeft.uses_width_as_height());
        assert!(!ImageOrientation::OriginBottomRight.uses_width_as_height());
        assert!(ImageOrientation::OriginLeftTop.uses_width_as_height());
        assert!(ImageOrientation::OriginRightBottom.uses_width_as_height());
    }

    #[test]
    fn default_orientation_is_identity() {
        let transform =
            ImageOrientation::OriginTopLeft.transform_from_default(Size::new(40.0, 30.0));
        assert_eq!(transform, Affine::IDENTITY);
    }

    #[test]
    fn upside_down_round_trips_corners() {
        let size = Size::new(40.0, 30.0);
        let transform = ImageOrientation::OriginBottomRight.transform_from_default(size);
        let mapped = transform * piet::kurbo::Point::new(0.0, 0.0);
        assert_eq!(mapped, piet::kurbo::Point::new(40.0, 30.0));
        let mapped = transform * piet::kurbo::Point::new(40.0, 30.0);
        assert_eq!(mapped, piet::kurbo::Point::new(0.0, 0.0));
    }

    #[test]
    fn dynamic_range_limit_values() {
        assert_eq!(DynamicRangeLimit::NoLimit.value(), 1.0);
        assert_eq!(DynamicRangeLimit::Constrained.value(), 0.5);
        assert_eq!(DynamicRangeLimit::Standard.value(), 0.0);
    }

    #[test]
    fn subimage_keys_quantize_to_pixels() {
        let a = SubimageKey::new(7, Rect::new(0.2, 0.4, 9.7, 9.9));
        let b = SubimageKey::new(7, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(a, b);
    }
}
