use std::ops::{Add, Sub};

use log::{debug, trace};
use roxmltree::{Document, Node};
use serde::Serialize;
use thiserror::Error;

use crate::utils::parse_coordinate;

/// Element names the editor uses to attach a link (and other metadata) to a cell.
const WRAPPER_TAGS: [&str; 2] = ["UserObject", "object"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to parse diagram XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("diagram page '{0}' is stored compressed; save it uncompressed to generate an image map")]
    CompressedPage(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

/// Parent-relative bounding box of a shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Box occupied by this shape after a 90 or 270 degree turn about its center.
    ///
    /// Width and height swap; the center stays put (integer halves).
    pub fn rotated_quarter_turn(&self) -> Rect {
        let center_x = self.x.saturating_add(self.width / 2);
        let center_y = self.y.saturating_add(self.height / 2);
        Rect::new(
            center_x.saturating_sub(self.height / 2),
            center_y.saturating_sub(self.width / 2),
            self.height,
            self.width,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Geometry {
    Bounds(Rect),
    /// Edges, arrows and curves: anchor points in document order.
    Points(Vec<Point>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub id: Option<String>,
    pub parent: Option<String>,
    pub style: Option<String>,
    pub link: Option<String>,
    pub link_target: Option<String>,
    pub geometry: Option<Geometry>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    pub fn with_bounds(mut self, x: i64, y: i64, width: i64, height: i64) -> Self {
        self.geometry = Some(Geometry::Bounds(Rect::new(x, y, width, height)));
        self
    }

    pub fn with_points(mut self, points: impl IntoIterator<Item = (i64, i64)>) -> Self {
        self.geometry = Some(Geometry::Points(
            points.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
        ));
        self
    }

    /// Identifier under which this cell may serve as a container, if any.
    pub fn container_id(&self) -> Option<&str> {
        non_empty(self.id.as_deref())
    }

    /// Parent reference, or `None` when the cell hangs off one of the root layers.
    pub fn parent_container(&self) -> Option<&str> {
        non_empty(self.parent.as_deref()).filter(|parent| !matches!(*parent, "0" | "1"))
    }

    pub fn link(&self) -> Option<&str> {
        non_empty(self.link.as_deref())
    }

    pub fn opens_in_new_window(&self) -> bool {
        self.link_target.as_deref() == Some("_blank")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Cells of a single diagram page, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramDocument {
    cells: Vec<Cell>,
}

impl DiagramDocument {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// Parses a draw.io `mxfile` or bare `mxGraphModel`.
    ///
    /// Only the first page of a multi-page file is read. Blank input yields
    /// an empty document.
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        if xml.trim().is_empty() {
            return Ok(Self::default());
        }

        let document = Document::parse(xml)?;
        Self::from_xml_document(&document)
    }

    pub fn from_xml_document(document: &Document<'_>) -> Result<Self, DocumentError> {
        let scope = match document
            .descendants()
            .find(|node| node.has_tag_name("mxGraphModel"))
        {
            Some(model) => model,
            None => {
                if let Some(page) = document
                    .descendants()
                    .find(|node| node.has_tag_name("diagram"))
                    .filter(|page| page.text().is_some_and(|text| !text.trim().is_empty()))
                {
                    let name = page
                        .attribute("name")
                        .or_else(|| page.attribute("id"))
                        .unwrap_or_default();
                    return Err(DocumentError::CompressedPage(name.to_string()));
                }
                document.root_element()
            }
        };

        let cells: Vec<Cell> = scope
            .descendants()
            .filter(|node| node.has_tag_name("mxCell"))
            .map(cell_from_node)
            .collect();

        debug!(cells = cells.len(); "Parsed diagram document");
        Ok(Self { cells })
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn linked_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|cell| cell.link().is_some())
    }
}

impl FromIterator<Cell> for DiagramDocument {
    fn from_iter<T: IntoIterator<Item = Cell>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

fn cell_from_node(node: Node<'_, '_>) -> Cell {
    let wrapper = node
        .parent_element()
        .filter(|parent| WRAPPER_TAGS.iter().any(|tag| parent.has_tag_name(*tag)));

    let inherited = |name: &str| -> Option<String> {
        non_empty(node.attribute(name))
            .or_else(|| wrapper.and_then(|wrapper| non_empty(wrapper.attribute(name))))
            .map(str::to_string)
    };

    let edge = node.attribute("edge") == Some("1");
    let cell = Cell {
        id: inherited("id"),
        parent: node.attribute("parent").map(str::to_string),
        style: node.attribute("style").map(str::to_string),
        link: inherited("link"),
        link_target: inherited("linkTarget"),
        geometry: node
            .descendants()
            .find(|child| child.has_tag_name("mxGeometry"))
            .map(|geometry| geometry_from_node(geometry, edge)),
    };

    trace!(id:? = cell.id, parent:? = cell.parent; "Read cell");
    cell
}

fn geometry_from_node(node: Node<'_, '_>, edge: bool) -> Geometry {
    let coordinate = |name: &str| non_empty(node.attribute(name)).map(parse_coordinate);
    let (x, y) = (coordinate("x"), coordinate("y"));

    let points: Vec<Point> = node
        .descendants()
        .filter(|child| child.has_tag_name("mxPoint"))
        .map(|point| {
            Point::new(
                point.attribute("x").map(parse_coordinate).unwrap_or(0),
                point.attribute("y").map(parse_coordinate).unwrap_or(0),
            )
        })
        .collect();

    // The editor omits zero coordinates, so a shape at the origin carries no x/y at all.
    // Connected edges carry neither coordinates nor points and contribute nothing.
    let relative = node.attribute("relative") == Some("1");
    let box_at_origin = points.is_empty() && !edge && !relative;
    if x.is_some() || y.is_some() || box_at_origin {
        Geometry::Bounds(Rect::new(
            x.unwrap_or(0),
            y.unwrap_or(0),
            coordinate("width").unwrap_or(0),
            coordinate("height").unwrap_or(0),
        ))
    } else {
        Geometry::Points(points)
    }
}
