//! Geometric OCR post-processing.
//!
//! The OCR port returns a flat list of word-level fields. This module turns
//! that stream into paragraph- and line-structured text by clustering token
//! centroids at two scales: paragraphs are separated by whitespace blocks
//! proportional to glyph height, lines within a paragraph by roughly one
//! glyph height.

use serde::{Deserialize, Serialize};

mod cluster;

/// A single word-level OCR result: recognized text plus its four-vertex
/// polygon and an optional confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct RawField {
    pub text: String,
    pub vertices: [Vertex; 4],
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned quadrilateral stored corner-by-corner:
/// `(x1,y1)` top-left, `(x2,y2)` top-right, `(x3,y3)` bottom-right,
/// `(x4,y4)` bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub x3: f32,
    pub y3: f32,
    pub x4: f32,
    pub y4: f32,
}

impl BBox {
    pub fn from_extent(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            x1: min_x,
            y1: min_y,
            x2: max_x,
            y2: min_y,
            x3: max_x,
            y3: max_y,
            x4: min_x,
            y4: max_y,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x3 - self.x1).abs() * (self.y3 - self.y1).abs()
    }
}

/// One block of page text. Lines are joined by `\n`; tokens within a line by
/// a single space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub text: String,
    pub bbox: BBox,
}

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.8;

struct Token {
    text: String,
    x: f32,
    y: f32,
}

/// Turn a flat field list into ordered paragraphs. Pure: identical input and
/// threshold always yield the identical paragraph list.
pub fn analyze(fields: &[RawField], conf_threshold: f32) -> Vec<Paragraph> {
    let surviving: Vec<&RawField> = fields
        .iter()
        .filter(|field| match field.confidence {
            Some(conf) => conf > conf_threshold,
            None => true,
        })
        .collect();
    if surviving.is_empty() {
        return Vec::new();
    }

    let font_size = estimate_font_size(&surviving);
    let tokens: Vec<Token> = surviving.iter().map(|field| reduce_token(field)).collect();

    let points: Vec<(f32, f32)> = tokens.iter().map(|token| (token.x, token.y)).collect();
    let paragraph_eps = (font_size * 6.0).max(15.0);
    let labels = cluster::dbscan(&points, paragraph_eps, 2);

    let mut groups: Vec<(usize, Vec<&Token>)> = Vec::new();
    for (token, label) in tokens.iter().zip(&labels) {
        let Some(label) = label else {
            continue;
        };
        match groups.iter().position(|(existing, _)| existing == label) {
            Some(position) => groups[position].1.push(token),
            None => groups.push((*label, vec![token])),
        }
    }
    groups.sort_by_key(|(label, _)| *label);

    let line_eps = (font_size * 0.5).max(2.0);
    groups
        .into_iter()
        .map(|(_, members)| build_paragraph(&members, line_eps))
        .collect()
}

/// Mean vertical extent of the surviving polygons; 0 when there are none.
fn estimate_font_size(fields: &[&RawField]) -> f32 {
    if fields.is_empty() {
        return 0.0;
    }
    let total: f32 = fields
        .iter()
        .map(|field| {
            let ys = field.vertices.map(|vertex| vertex.y);
            let min = ys.iter().copied().fold(f32::INFINITY, f32::min);
            let max = ys.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            max - min
        })
        .sum();
    total / fields.len() as f32
}

fn reduce_token(field: &RawField) -> Token {
    let x = field.vertices.iter().map(|vertex| vertex.x).sum::<f32>() / 4.0;
    let y = field.vertices.iter().map(|vertex| vertex.y).sum::<f32>() / 4.0;
    Token {
        text: field.text.clone(),
        x,
        y,
    }
}

fn build_paragraph(tokens: &[&Token], line_eps: f32) -> Paragraph {
    let ys: Vec<f32> = tokens.iter().map(|token| token.y).collect();
    let labels = cluster::dbscan_1d(&ys, line_eps, 1);

    let mut lines: Vec<(usize, Vec<&Token>)> = Vec::new();
    for (token, label) in tokens.iter().copied().zip(&labels) {
        // min_samples = 1 makes every token a core point, so no noise here.
        let Some(label) = label else {
            continue;
        };
        match lines.iter().position(|(existing, _)| existing == label) {
            Some(position) => lines[position].1.push(token),
            None => lines.push((*label, vec![token])),
        }
    }

    let mut ordered: Vec<(f32, String)> = lines
        .into_iter()
        .map(|(_, mut members)| {
            members.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));
            let mean_y = members.iter().map(|token| token.y).sum::<f32>() / members.len() as f32;
            let text = members
                .iter()
                .map(|token| token.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            (mean_y, text)
        })
        .collect();
    ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let text = ordered
        .into_iter()
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n");

    let min_x = tokens.iter().map(|t| t.x).fold(f32::INFINITY, f32::min);
    let max_x = tokens.iter().map(|t| t.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = tokens.iter().map(|t| t.y).fold(f32::INFINITY, f32::min);
    let max_y = tokens.iter().map(|t| t.y).fold(f32::NEG_INFINITY, f32::max);

    Paragraph {
        text,
        bbox: BBox::from_extent(min_x, min_y, max_x, max_y),
    }
}
