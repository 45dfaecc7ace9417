use std::collections::HashMap;
use std::collections::hash_map::Entry;

use log::{debug, trace};
use serde::Serialize;

use crate::document::{Cell, DiagramDocument, Geometry, Point, Rect};

/// Crop applied by the renderer: the smallest absolute coordinate in the diagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalOffset {
    pub offset_x: i64,
    pub offset_y: i64,
}

impl GlobalOffset {
    pub fn as_point(&self) -> Point {
        Point::new(self.offset_x, self.offset_y)
    }
}

/// Absolute positions discovered in one pass over a diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCoordinates {
    containers: HashMap<String, Point>,
    points: Vec<Point>,
}

impl ResolvedCoordinates {
    /// Absolute top-left of a cell that can act as a container.
    pub fn container(&self, id: &str) -> Option<Point> {
        self.containers.get(id).copied()
    }

    pub fn containers(&self) -> &HashMap<String, Point> {
        &self.containers
    }

    /// Positions that never serve as parents: edge points and anonymous shapes.
    pub fn standalone_points(&self) -> &[Point] {
        &self.points
    }

    /// Absolute offset contributed by the cell's parent; unknown parents count as the origin.
    pub fn parent_offset(&self, cell: &Cell) -> Point {
        cell.parent_container()
            .and_then(|parent| self.container(parent))
            .unwrap_or(Point::ORIGIN)
    }

    pub fn global_offset(&self) -> GlobalOffset {
        let all = self.containers.values().chain(self.points.iter());
        let (min_x, min_y) = all.fold((None, None), |(min_x, min_y), point| {
            (
                Some(min_x.map_or(point.x, |x: i64| x.min(point.x))),
                Some(min_y.map_or(point.y, |y: i64| y.min(point.y))),
            )
        });

        GlobalOffset {
            offset_x: min_x.unwrap_or(0),
            offset_y: min_y.unwrap_or(0),
        }
    }

    fn record_container(&mut self, id: &str, position: Point) {
        match self.containers.entry(id.to_string()) {
            Entry::Occupied(_) => {
                trace!(id; "Ignoring repeated container id");
            }
            Entry::Vacant(slot) => {
                slot.insert(position);
            }
        }
    }
}

/// Whether the style turns the shape by a quarter (90 or 270 degrees).
///
/// Any `;`-separated token whose key merely starts with `rotation` counts.
pub fn is_rotated(style: &str) -> bool {
    style
        .split(';')
        .filter(|token| token.starts_with("rotation"))
        .filter_map(|token| token.split('=').nth(1))
        .filter_map(|degrees| degrees.trim().parse::<f64>().ok())
        .any(|degrees| degrees == 90.0 || degrees == 270.0)
}

/// Geometry of a cell with rotation applied; the cell itself is left untouched.
pub fn normalized_geometry(cell: &Cell) -> Option<Geometry> {
    let geometry = cell.geometry.as_ref()?;
    match geometry {
        Geometry::Bounds(rect) if cell.style.as_deref().is_some_and(is_rotated) => {
            Some(Geometry::Bounds(rect.rotated_quarter_turn()))
        }
        other => Some(other.clone()),
    }
}

/// Normalized bounding box of a cell, when it has one.
pub fn normalized_bounds(cell: &Cell) -> Option<Rect> {
    match normalized_geometry(cell)? {
        Geometry::Bounds(rect) => Some(rect),
        Geometry::Points(_) => None,
    }
}

/// Resolves every cell to absolute diagram coordinates in document order.
///
/// A parent that has not been seen yet resolves to the origin.
pub fn resolve_coordinates(document: &DiagramDocument) -> ResolvedCoordinates {
    let mut resolved = ResolvedCoordinates::default();

    for cell in document.cells() {
        let Some(geometry) = normalized_geometry(cell) else {
            continue;
        };
        let parent = resolved.parent_offset(cell);

        match geometry {
            Geometry::Bounds(rect) => {
                let absolute = parent + rect.top_left();
                match cell.container_id() {
                    Some(id) => resolved.record_container(id, absolute),
                    None => resolved.points.push(absolute),
                }
            }
            Geometry::Points(points) => {
                resolved
                    .points
                    .extend(points.into_iter().map(|point| parent + point));
            }
        }
    }

    debug!(
        containers = resolved.containers.len(),
        points = resolved.points.len();
        "Resolved diagram coordinates"
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_detection_uses_loose_prefix() {
        assert!(is_rotated("rounded=0;rotation=90;html=1;"));
        assert!(is_rotated("rotation=270"));
        assert!(is_rotated("rotationAngle=90"));
        assert!(is_rotated("rotation=90.0"));
        assert!(!is_rotated("rotation=45"));
        assert!(!is_rotated("rotation"));
        assert!(!is_rotated("textRotation=90"));
        assert!(!is_rotated(""));
        assert!(is_rotated("rotation=10;rotation=90"));
    }

    #[test]
    fn rotated_box_is_normalized_before_resolution() {
        let cell = Cell::new()
            .with_id("r")
            .with_parent("1")
            .with_style("rotation=90;")
            .with_bounds(0, 0, 100, 40);
        assert_eq!(normalized_bounds(&cell), Some(Rect::new(30, -30, 40, 100)));

        let resolved = resolve_coordinates(&DiagramDocument::new(vec![cell.clone()]));
        assert_eq!(resolved.container("r"), Some(Point::new(30, -30)));
        assert_eq!(cell.geometry, Some(Geometry::Bounds(Rect::new(0, 0, 100, 40))));
    }

    #[test]
    fn other_angles_are_left_alone() {
        let cell = Cell::new().with_style("rotation=45").with_bounds(5, 6, 10, 20);
        assert_eq!(normalized_bounds(&cell), Some(Rect::new(5, 6, 10, 20)));
    }

    #[test]
    fn nested_cells_accumulate_parent_offsets() {
        let document = DiagramDocument::new(vec![
            Cell::new().with_id("0"),
            Cell::new().with_id("1").with_parent("0"),
            Cell::new().with_id("outer").with_parent("1").with_bounds(100, 100, 300, 300),
            Cell::new().with_id("inner").with_parent("outer").with_bounds(10, 10, 50, 50),
            Cell::new().with_id("leaf").with_parent("inner").with_bounds(1, 2, 5, 5),
        ]);

        let resolved = resolve_coordinates(&document);
        assert_eq!(resolved.container("outer"), Some(Point::new(100, 100)));
        assert_eq!(resolved.container("inner"), Some(Point::new(110, 110)));
        assert_eq!(resolved.container("leaf"), Some(Point::new(111, 112)));
        assert!(resolved.container("0").is_none());
        assert!(resolved.standalone_points().is_empty());
    }

    #[test]
    fn forward_references_resolve_to_origin() {
        let document = DiagramDocument::new(vec![
            Cell::new().with_id("child").with_parent("later").with_bounds(10, 10, 5, 5),
            Cell::new().with_id("later").with_parent("1").with_bounds(100, 100, 50, 50),
        ]);

        let resolved = resolve_coordinates(&document);
        assert_eq!(resolved.container("child"), Some(Point::new(10, 10)));
    }

    #[test]
    fn edges_and_anonymous_shapes_are_standalone_points() {
        let document = DiagramDocument::new(vec![
            Cell::new().with_id("box").with_parent("1").with_bounds(50, 60, 10, 10),
            Cell::new()
                .with_id("edge")
                .with_parent("box")
                .with_points([(-5, 0), (20, 30)]),
            Cell::new().with_parent("1").with_bounds(7, 8, 1, 1),
        ]);

        let resolved = resolve_coordinates(&document);
        assert!(resolved.container("edge").is_none());
        assert_eq!(
            resolved.standalone_points(),
            &[Point::new(45, 60), Point::new(70, 90), Point::new(7, 8)]
        );
    }

    #[test]
    fn first_position_for_an_id_wins() {
        let document = DiagramDocument::new(vec![
            Cell::new().with_id("dup").with_bounds(1, 1, 1, 1),
            Cell::new().with_id("dup").with_bounds(9, 9, 1, 1),
        ]);
        assert_eq!(
            resolve_coordinates(&document).container("dup"),
            Some(Point::new(1, 1))
        );
    }

    #[test]
    fn global_offset_is_minimum_across_both_collections() {
        let document = DiagramDocument::new(vec![
            Cell::new().with_id("a").with_bounds(5, 40, 10, 10),
            Cell::new().with_points([(30, -3)]),
            Cell::new().with_id("b").with_bounds(50, 50, 10, 10),
        ]);

        assert_eq!(
            resolve_coordinates(&document).global_offset(),
            GlobalOffset {
                offset_x: 5,
                offset_y: -3
            }
        );
    }

    #[test]
    fn empty_document_has_zero_offset() {
        let resolved = resolve_coordinates(&DiagramDocument::default());
        assert_eq!(resolved.global_offset(), GlobalOffset::default());
    }
}
