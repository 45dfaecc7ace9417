pub mod document;
pub mod extract;
pub mod image_map;
pub mod resolve;
pub mod utils;

pub use document::*;
pub use extract::*;
pub use image_map::*;
pub use resolve::*;
pub use utils::*;

pub const DEFAULT_MAP_NAME: &str = "imagemap";
pub const MAP_NAME_ENV: &str = "MXMAP_MAP_NAME";

/// Builds the image map markup straight from draw.io XML, PNG, SVG or data uri bytes.
pub fn image_map_from_bytes(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    let xml = extract_diagram_xml(bytes)?;
    let document = DiagramDocument::parse(&xml)?;
    Ok(generate_image_map(&document, name))
}
