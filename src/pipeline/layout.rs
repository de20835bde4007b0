//! Card layout: record + background → SVG scene.
//!
//! The card is a centred column on top of a blurred, darkened cover image:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │            apple             │  term, 36 px bold
//! │   UK: /ˈæp.əl/, US: /ˈæp.əl/ │  phonetics, 18 px
//! │         ──────────           │  divider (60 % width)
//! │            苹果              │  translation, 20 px Kai
//! │        一种常见的水果。       │  explanation, 16 px Kai, line breaks kept
//! └──────────────────────────────┘
//! ```
//!
//! Text wrapping is estimated from glyph classes (CJK glyphs are one em
//! wide, Latin glyphs about half an em); the SVG is then handed to `usvg`
//! for real shaping.

use crate::record::WordRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};

const PADDING: f32 = 28.0;
const MIN_HEIGHT: f32 = 300.0;
const CORNER_RADIUS: f32 = 16.0;
const OVERLAY_OPACITY: f32 = 0.45;
const BLUR_STD_DEV: f32 = 8.0;
/// Colour of the placeholder drawn when no background could be loaded.
pub const PLACEHOLDER_FILL: &str = "#2E7D32";

const LATIN_FAMILY: &str = "Arial, Helvetica, sans-serif";
const KAI_FAMILY: &str = "KaiTi, SimKai, 'Noto Sans SC', 'Noto Sans CJK SC', sans-serif";

/// A decoded background, re-encoded as PNG for embedding.
#[derive(Debug, Clone)]
pub struct BackgroundImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// What fills the card behind the text.
#[derive(Debug, Clone)]
pub enum CardBackground {
    Image(std::sync::Arc<BackgroundImage>),
    /// Every load attempt failed; a flat fill stands in.
    Placeholder,
}

/// A laid-out card.
#[derive(Debug, Clone)]
pub struct CardScene {
    pub svg: String,
    pub width: f32,
    pub height: f32,
}

struct TextBlock {
    lines: Vec<String>,
    size: f32,
    line_height: f32,
    bold: bool,
    fill: &'static str,
    family: &'static str,
}

enum Block {
    Text(TextBlock),
    Divider,
}

impl Block {
    fn height(&self) -> f32 {
        match self {
            Block::Text(t) => t.lines.len() as f32 * t.line_height,
            Block::Divider => 1.0,
        }
    }
}

/// Lay out `record` on a card `width` CSS pixels wide.
pub fn card_scene(record: &WordRecord, background: &CardBackground, width: u32) -> CardScene {
    let width = width as f32;
    let text_width = width - 2.0 * PADDING;

    let term = record.english_term.trim();
    let translation = record.chinese_translation.trim();
    let explanation = record.chinese_explanation.trim();
    let phonetics = record.phonetics_line();

    // (gap before, block)
    let mut blocks: Vec<(f32, Block)> = Vec::new();
    if !term.is_empty() {
        blocks.push((
            0.0,
            Block::Text(TextBlock {
                lines: wrap(term, 36.0, text_width, 0.6),
                size: 36.0,
                line_height: 45.0,
                bold: true,
                fill: "#FFFFFF",
                family: LATIN_FAMILY,
            }),
        ));
    }
    if let Some(ref p) = phonetics {
        blocks.push((
            12.0,
            Block::Text(TextBlock {
                lines: wrap(p, 18.0, text_width, 0.55),
                size: 18.0,
                line_height: 28.0,
                bold: false,
                fill: "#E0E0E0",
                family: LATIN_FAMILY,
            }),
        ));
        if !translation.is_empty() || !explanation.is_empty() {
            blocks.push((20.0, Block::Divider));
        }
    }
    let after_divider = matches!(blocks.last(), Some((_, Block::Divider)));
    if !translation.is_empty() {
        blocks.push((
            if after_divider { 20.0 } else { 12.0 },
            Block::Text(TextBlock {
                lines: wrap(translation, 20.0, text_width, 0.55),
                size: 20.0,
                line_height: 32.5,
                bold: false,
                fill: "#FFFFFF",
                family: KAI_FAMILY,
            }),
        ));
    }
    if !explanation.is_empty() {
        let after_divider = matches!(blocks.last(), Some((_, Block::Divider)));
        blocks.push((
            if after_divider { 20.0 } else { 12.0 },
            Block::Text(TextBlock {
                lines: wrap(explanation, 16.0, text_width, 0.55),
                size: 16.0,
                line_height: 26.0,
                bold: false,
                fill: "#F0F0F0",
                family: KAI_FAMILY,
            }),
        ));
    }
    if let Some((gap, _)) = blocks.first_mut() {
        *gap = 0.0;
    }

    let content_height: f32 = blocks.iter().map(|(gap, b)| gap + b.height()).sum();
    let height = (content_height + 2.0 * PADDING).max(MIN_HEIGHT).ceil();
    let centre = width / 2.0;

    let mut svg = String::with_capacity(4096);
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    ));
    svg.push_str(&format!(
        r#"<defs><clipPath id="card"><rect x="0" y="0" width="{width}" height="{height}" rx="{CORNER_RADIUS}" ry="{CORNER_RADIUS}"/></clipPath><filter id="soften" x="-10%" y="-10%" width="120%" height="120%"><feGaussianBlur stdDeviation="{BLUR_STD_DEV}"/></filter></defs>"#
    ));
    svg.push_str(r#"<g clip-path="url(#card)">"#);

    match background {
        CardBackground::Image(img) => svg.push_str(&format!(
            r#"<image x="0" y="0" width="{width}" height="{height}" preserveAspectRatio="xMidYMid slice" filter="url(#soften)" xlink:href="data:image/png;base64,{}"/>"#,
            STANDARD.encode(&img.png)
        )),
        CardBackground::Placeholder => svg.push_str(&format!(
            r#"<rect x="0" y="0" width="{width}" height="{height}" fill="{PLACEHOLDER_FILL}"/>"#
        )),
    }
    svg.push_str(&format!(
        r##"<rect x="0" y="0" width="{width}" height="{height}" fill="#000000" fill-opacity="{OVERLAY_OPACITY}"/>"##
    ));

    let mut y = (height - content_height) / 2.0;
    for (gap, block) in &blocks {
        y += gap;
        match block {
            Block::Text(t) => {
                for (i, line) in t.lines.iter().enumerate() {
                    if line.is_empty() {
                        continue;
                    }
                    let baseline = y + i as f32 * t.line_height + t.line_height / 2.0 + t.size * 0.35;
                    svg.push_str(&format!(
                        r#"<text x="{centre}" y="{baseline:.1}" text-anchor="middle" font-family="{}" font-size="{}" font-weight="{}" fill="{}">{}</text>"#,
                        t.family,
                        t.size,
                        if t.bold { "bold" } else { "normal" },
                        t.fill,
                        escape_xml(line)
                    ));
                }
            }
            Block::Divider => {
                let w = width * 0.6;
                svg.push_str(&format!(
                    r##"<rect x="{:.1}" y="{y:.1}" width="{w:.1}" height="1" fill="#FFFFFF" fill-opacity="0.3"/>"##,
                    (width - w) / 2.0
                ));
            }
        }
        y += block.height();
    }

    svg.push_str("</g></svg>");
    CardScene { svg, width, height }
}

fn is_wide(ch: char) -> bool {
    matches!(ch,
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{A4CF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FE30}'..='\u{FE4F}'
        | '\u{FF00}'..='\u{FF60}'
        | '\u{FFE0}'..='\u{FFE6}')
}

fn char_width(ch: char, size: f32, latin_em: f32) -> f32 {
    if is_wide(ch) {
        size
    } else {
        size * latin_em
    }
}

/// Greedy wrap. Newlines start a new line (blank lines are kept);
/// Latin text breaks at the last space, CJK text at any glyph.
pub(crate) fn wrap(text: &str, size: f32, max_width: f32, latin_em: f32) -> Vec<String> {
    let mut out = Vec::new();
    for para in text.split('\n') {
        let mut line = String::new();
        let mut w = 0.0_f32;
        for ch in para.trim_end().chars() {
            let cw = char_width(ch, size, latin_em);
            if w + cw > max_width && !line.is_empty() {
                let split = if is_wide(ch) { None } else { line.rfind(' ') };
                match split {
                    Some(pos) if pos > 0 => {
                        let rest = line[pos + 1..].to_string();
                        line.truncate(pos);
                        out.push(line.trim_end().to_string());
                        line = rest;
                    }
                    _ => out.push(std::mem::take(&mut line)),
                }
                w = line.chars().map(|c| char_width(c, size, latin_em)).sum();
                if ch == ' ' && line.is_empty() {
                    continue;
                }
            }
            line.push(ch);
            w += cw;
        }
        out.push(line);
    }
    out
}

pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
