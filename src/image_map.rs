use log::{debug, trace};
use serde::Serialize;

use crate::document::{Cell, DiagramDocument, Point};
use crate::resolve::{GlobalOffset, ResolvedCoordinates, normalized_bounds, resolve_coordinates};
use crate::utils::escape_xml;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionShape {
    Rect,
}

impl RegionShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionShape::Rect => "rect",
        }
    }
}

/// One clickable hotspot, in pixels of the cropped image.
///
/// `x2`/`y2` are the bottom-right corner, not a width and height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Region {
    pub shape: RegionShape,
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Region {
    pub fn coords(&self) -> String {
        format!("{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }

    fn from_cell(
        cell: &Cell,
        resolved: &ResolvedCoordinates,
        offset: GlobalOffset,
    ) -> Option<Region> {
        let href = cell.link()?;
        let bounds = normalized_bounds(cell)?;

        let top_left: Point = resolved.parent_offset(cell) + bounds.top_left() - offset.as_point();

        Some(Region {
            shape: RegionShape::Rect,
            x1: top_left.x,
            y1: top_left.y,
            x2: top_left.x.saturating_add(bounds.width),
            y2: top_left.y.saturating_add(bounds.height),
            href: href.to_string(),
            target: cell.opens_in_new_window().then(|| "_blank".to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageMap {
    pub name: String,
    pub offset: GlobalOffset,
    pub regions: Vec<Region>,
}

impl ImageMap {
    pub fn build(document: &DiagramDocument, name: &str) -> ImageMap {
        let resolved = resolve_coordinates(document);
        let offset = resolved.global_offset();
        debug!(offset_x = offset.offset_x, offset_y = offset.offset_y; "Computed crop offset");

        let regions: Vec<Region> = document
            .linked_cells()
            .filter_map(|cell| {
                let region = Region::from_cell(cell, &resolved, offset);
                if region.is_none() {
                    trace!(link:? = cell.link(); "Skipping link without a bounding box");
                }
                region
            })
            .collect();

        debug!(name, regions = regions.len(); "Built image map");
        ImageMap {
            name: name.to_string(),
            offset,
            regions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// `<map>` markup for the regions, or an empty string when there are none.
    pub fn to_markup(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut markup = format!("<map name=\"{}\">", escape_xml(&self.name));
        for region in &self.regions {
            markup.push_str(&format!(
                "<area shape=\"{}\" coords=\"{}\" href=\"{}\"",
                region.shape.as_str(),
                region.coords(),
                escape_xml(&region.href)
            ));
            if let Some(target) = &region.target {
                markup.push_str(&format!(" target=\"{}\"", escape_xml(target)));
            }
            markup.push_str("/>");
        }
        markup.push_str("</map>");
        markup
    }
}

/// Builds the image map for `document` and serializes it in one step.
pub fn generate_image_map(document: &DiagramDocument, name: &str) -> String {
    ImageMap::build(document, name).to_markup()
}
