use std::io::Cursor;
use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, trace};
use regex::Regex;
use roxmltree::Document;
use thiserror::Error;

use crate::utils::percent_decode;

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];
const MXFILE_KEYWORD: &str = "mxfile";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no embedded draw.io diagram found in {0}")]
    MissingDiagram(&'static str),
    #[error("png image could not be decoded: {0}")]
    Png(#[from] png::DecodingError),
    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),
    #[error("svg image could not be parsed: {0}")]
    Svg(#[from] roxmltree::Error),
    #[error("input is neither a png, an svg nor draw.io xml")]
    UnsupportedInput,
}

/// Container the diagram was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Png,
    Svg,
    Xml,
}

impl SourceKind {
    /// Sniffs the container from leading bytes.
    pub fn detect(bytes: &[u8]) -> Option<SourceKind> {
        if bytes.starts_with(&PNG_SIGNATURE) {
            return Some(SourceKind::Png);
        }
        let text = std::str::from_utf8(bytes).ok()?;
        if text.contains("<svg") {
            Some(SourceKind::Svg)
        } else if text.contains("<mxfile") || text.contains("<mxGraphModel") {
            Some(SourceKind::Xml)
        } else {
            None
        }
    }
}

/// Returns the draw.io XML embedded in a png, svg or `data:` uri, or the
/// input itself when it already is draw.io XML.
pub fn extract_diagram_xml(bytes: &[u8]) -> Result<String, ExtractError> {
    if let Some(payload) = strip_data_uri(bytes)? {
        debug!(bytes = payload.len(); "Decoded data uri");
        return extract_diagram_xml(&payload);
    }

    match SourceKind::detect(bytes) {
        Some(SourceKind::Png) => extract_from_png(bytes),
        Some(SourceKind::Svg) => {
            let text = String::from_utf8_lossy(bytes);
            extract_from_svg(&text)
        }
        Some(SourceKind::Xml) => Ok(String::from_utf8_lossy(bytes).trim().to_string()),
        None => Err(ExtractError::UnsupportedInput),
    }
}

/// Reads the `mxfile` text chunk the editor writes into exported PNGs.
///
/// Plain `tEXt`, compressed `zTXt` and international `iTXt` chunks are all
/// searched, in that order.
pub fn extract_from_png(bytes: &[u8]) -> Result<String, ExtractError> {
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return Err(ExtractError::MissingDiagram("png"));
    }

    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_ignore_text_chunk(false);
    let reader = decoder.read_info()?;
    let info = reader.info();

    let mut texts: Vec<(&str, String)> = info
        .uncompressed_latin1_text
        .iter()
        .map(|chunk| (chunk.keyword.as_str(), chunk.text.clone()))
        .collect();
    for chunk in &info.compressed_latin1_text {
        texts.push((chunk.keyword.as_str(), chunk.get_text()?));
    }
    for chunk in &info.utf8_text {
        texts.push((chunk.keyword.as_str(), chunk.get_text()?));
    }

    for (keyword, text) in texts {
        trace!(keyword; "Visiting png text chunk");
        if keyword == MXFILE_KEYWORD || text.contains(MXFILE_KEYWORD) {
            let decoded = percent_decode(&text);
            return cut_mxfile(&decoded).ok_or(ExtractError::MissingDiagram("png"));
        }
    }

    Err(ExtractError::MissingDiagram("png"))
}

/// Reads the `content` attribute of the root `<svg>` element.
pub fn extract_from_svg(svg: &str) -> Result<String, ExtractError> {
    let document = Document::parse(svg)?;
    document
        .root_element()
        .attribute("content")
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string)
        .ok_or(ExtractError::MissingDiagram("svg"))
}

fn cut_mxfile(text: &str) -> Option<String> {
    static MXFILE: OnceLock<Regex> = OnceLock::new();
    let pattern = MXFILE.get_or_init(|| {
        Regex::new(r"(?s)<mxfile.*?>.*?</mxfile>").expect("mxfile pattern is valid")
    });
    pattern
        .find(text)
        .map(|found| found.as_str().trim().to_string())
}

fn strip_data_uri(bytes: &[u8]) -> Result<Option<Vec<u8>>, ExtractError> {
    let Some(uri) = std::str::from_utf8(bytes)
        .ok()
        .map(str::trim)
        .and_then(|text| text.strip_prefix("data:"))
    else {
        return Ok(None);
    };

    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| ExtractError::InvalidDataUri("missing ',' separator".to_string()))?;

    if !header.split(';').any(|param| param == "base64") {
        return Ok(Some(percent_decode(payload).into_bytes()));
    }

    STANDARD
        .decode(payload.trim())
        .map(Some)
        .map_err(|err| ExtractError::InvalidDataUri(err.to_string()))
}
