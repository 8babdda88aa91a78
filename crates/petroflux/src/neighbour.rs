//! Neighbouring-source mask over an aperture bounding box.
//!
//! Built from the thresholded label raster: a pixel above the detection
//! threshold that is not part of the current source belongs to a neighbour.

use serde::{Deserialize, Serialize};

use crate::aperture::BoundingBox;
use crate::buffer::PixelBuffer;

/// Integer pixel coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: i64,
    pub y: i64,
}

/// Per-pixel neighbour/background classification within a bounding box.
#[derive(Debug, Clone)]
pub struct NeighbourMask {
    bbox: BoundingBox,
    neighbour: Vec<bool>,
    object: Vec<bool>,
}

impl NeighbourMask {
    /// Classify every pixel of `bbox` against the thresholded raster, then
    /// clear the pixels owned by the current source.
    ///
    /// Pixels of the box falling outside the raster count as background.
    pub fn new(bbox: BoundingBox, source_pixels: &[PixelCoord], labels: &PixelBuffer) -> Self {
        let w = bbox.width().max(0) as usize;
        let h = bbox.height().max(0) as usize;
        let mut neighbour = vec![false; w * h];
        let mut object = vec![false; w * h];

        for y in bbox.min_y..bbox.max_y {
            for x in bbox.min_x..bbox.max_x {
                if labels.in_bounds(x, y) && labels.value(x, y) > 0.0 {
                    let idx = (y - bbox.min_y) as usize * w + (x - bbox.min_x) as usize;
                    neighbour[idx] = true;
                    object[idx] = true;
                }
            }
        }

        for p in source_pixels {
            if bbox.contains(p.x, p.y) {
                let idx = (p.y - bbox.min_y) as usize * w + (p.x - bbox.min_x) as usize;
                neighbour[idx] = false;
            }
        }

        Self {
            bbox,
            neighbour,
            object,
        }
    }

    /// Whether the pixel belongs to a source other than the current one.
    /// Pixels outside the bounding box answer `false`.
    pub fn is_neighbour(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some_and(|idx| self.neighbour[idx])
    }

    /// Whether the pixel is below the detection threshold.
    pub fn is_background(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_none_or(|idx| !self.object[idx])
    }

    /// Any neighbour pixel anywhere in the bounding box?
    pub fn any_neighbour(&self) -> bool {
        self.neighbour.iter().any(|&n| n)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    #[inline]
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if !self.bbox.contains(x, y) {
            return None;
        }
        let w = self.bbox.width() as usize;
        Some((y - self.bbox.min_y) as usize * w + (x - self.bbox.min_x) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox {
            min_x: 0,
            min_y: 0,
            max_x: 6,
            max_y: 6,
        }
    }

    #[test]
    fn labels_split_into_source_and_neighbours() {
        // Two detected blobs: (1,1)-(2,1) owned by the source, (4,4) a neighbour.
        let labels = PixelBuffer::from_fn(6, 6, |x, y| {
            if (y == 1 && (x == 1 || x == 2)) || (x == 4 && y == 4) {
                1.0
            } else {
                0.0
            }
        });
        let own = [PixelCoord { x: 1, y: 1 }, PixelCoord { x: 2, y: 1 }];
        let mask = NeighbourMask::new(bbox(), &own, &labels);

        assert!(!mask.is_neighbour(1, 1));
        assert!(!mask.is_neighbour(2, 1));
        assert!(mask.is_neighbour(4, 4));
        assert!(!mask.is_neighbour(0, 0));
        assert!(mask.any_neighbour());

        assert!(!mask.is_background(1, 1));
        assert!(!mask.is_background(4, 4));
        assert!(mask.is_background(3, 3));
    }

    #[test]
    fn out_of_box_queries_are_background() {
        let labels = PixelBuffer::constant(6, 6, 1.0);
        let mask = NeighbourMask::new(bbox(), &[], &labels);
        assert!(!mask.is_neighbour(10, 10));
        assert!(mask.is_background(-3, 2));
    }

    #[test]
    fn box_clipped_against_raster() {
        // Box hangs over the raster edge; outside pixels are background.
        let labels = PixelBuffer::constant(3, 3, 5.0);
        let wide = BoundingBox {
            min_x: -2,
            min_y: -2,
            max_x: 5,
            max_y: 5,
        };
        let mask = NeighbourMask::new(wide, &[], &labels);
        assert!(mask.is_neighbour(1, 1));
        assert!(!mask.is_neighbour(-1, -1));
        assert!(mask.is_background(4, 4));
    }
}
