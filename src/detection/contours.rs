use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use crate::models::{BoundingBox, Region};

/// Find the outer borders of foreground blobs in a binary mask.
///
/// Borders nested inside another blob (holes, and anything inside holes)
/// are ignored.
pub fn outer_contours(mask: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let bbox = BoundingBox::from_points(&c.points)?;
            Some(Region {
                bbox,
                area: polygon_area(&c.points),
                contour: c.points,
                class_id: None,
                label: None,
                confidence: None,
                estimated_count: 1,
            })
        })
        .collect()
}

/// Area enclosed by a closed polygon (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area: i64 = 0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area.abs() as f64) / 2.0
}
