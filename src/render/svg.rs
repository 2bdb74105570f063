use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use usvg::{Options, Tree};

use super::DrawOp;
use crate::font::{GlyphMeasure, Typeface, system_fonts};

/// Composes the page image and the draw ops into one SVG document.
pub fn render_page_svg(
    page_png: &[u8],
    width: u32,
    height: u32,
    ops: &[DrawOp],
    typeface: &Typeface,
) -> String {
    let encoded = BASE64.encode(page_png);
    let data_uri = format!("data:image/png;base64,{}", encoded);

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    let family_attr = typeface
        .family()
        .map(|family| format!(r#" font-family="{}""#, escape_xml(family)))
        .unwrap_or_default();

    for op in ops {
        match op {
            DrawOp::FillRect {
                x,
                y,
                width,
                height,
                color,
            } => {
                svg.push_str(&format!(
                    r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}"/>"#,
                    x = x,
                    y = y,
                    w = width,
                    h = height,
                    fill = color.to_hex()
                ));
            }
            DrawOp::Text {
                text,
                x,
                y,
                font_size,
                color,
            } => {
                let baseline = y + typeface.ascent(*font_size as f32);
                svg.push_str(&format!(
                    r#"<text x="{x}" y="{y}" font-size="{size}" fill="{fill}"{family} xml:space="preserve">{text}</text>"#,
                    x = x,
                    y = baseline,
                    size = font_size,
                    fill = color.to_hex(),
                    family = family_attr,
                    text = escape_xml(text)
                ));
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

/// Rasterizes an SVG and encodes it in `format`.
pub fn rasterize_svg(svg: &str, format: ImageFormat, font_data: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut db = system_fonts().clone();
    if let Some(data) = font_data {
        db.load_font_data(data.to_vec());
    }
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).to_rgb8()),
        _ => DynamicImage::ImageRgba8(image),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .with_context(|| "failed to encode rendered page")?;
    Ok(bytes)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .with_context(|| "failed to encode page as PNG")?;
    Ok(bytes)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
