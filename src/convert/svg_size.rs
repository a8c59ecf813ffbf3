//! SVG 尺寸解析与输出像素计算模块
//!
//! # 设计思路
//!
//! 引擎需要显式的输出宽高，不能依赖其默认缩放。本模块从 `<svg>` 根标签
//! 尽力解析 CSS 像素尺寸（`width`/`height` 属性优先，其次 `viewBox`，
//! 都取不到时用 CSS 规定的 300×150 默认视口），再按 `dpi / 96`
//! 缩放为输出像素并钳制长边上限。
//!
//! # 实现思路
//!
//! - 只用正则扫描根标签，不做 XML 解析 —— 畸形文档同样能给出
//!   "尽力而为" 的尺寸，真正的语法错误由引擎报告。
//! - 绝对长度单位（in/pt/pc/mm/cm）换算为 CSS 像素；
//!   依赖视口或字体上下文的单位（% / em / vw 等）视为不可用。

use once_cell::sync::Lazy;
use regex::Regex;

static SVG_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg\b[^>]*>").expect("SVG 根标签正则应当合法"));
static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z%]*)\s*$").expect("长度正则应当合法"));

/// CSS 默认视口尺寸（SVG 规范）
const CSS_DEFAULT_WIDTH: f64 = 300.0;
const CSS_DEFAULT_HEIGHT: f64 = 150.0;

/// 根标签解析出的 CSS 像素尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgCssSize {
    pub width_px: f64,
    pub height_px: f64,
}

fn extract_attr(tag: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?i)\b{name}\s*=\s*["']([^"']+)["']"#
    ))
    .ok()?;
    re.captures(tag)
        .map(|caps| caps[1].trim().to_string())
}

fn length_to_css_px(value: &str) -> Option<f64> {
    let caps = LENGTH_RE.captures(value)?;
    let num: f64 = caps[1].parse().ok()?;
    let unit = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();

    match unit.as_str() {
        "" | "px" => Some(num),
        "in" => Some(num * 96.0),
        "pt" => Some(num * (96.0 / 72.0)),
        "pc" => Some(num * 16.0),
        "mm" => Some(num * (96.0 / 25.4)),
        "cm" => Some(num * (96.0 / 2.54)),
        // 相对单位需要视口/字体上下文，这里无法求值
        _ => None,
    }
}

fn parse_viewbox(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() != 4 {
        return None;
    }
    let w: f64 = parts[2].parse().ok()?;
    let h: f64 = parts[3].parse().ok()?;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    Some((w, h))
}

/// 尽力解析 SVG 的 CSS 像素尺寸
pub fn parse_svg_css_size(svg_text: &str) -> SvgCssSize {
    let default = SvgCssSize {
        width_px: CSS_DEFAULT_WIDTH,
        height_px: CSS_DEFAULT_HEIGHT,
    };
    let tag = match SVG_TAG_RE.find(svg_text) {
        Some(m) => m.as_str(),
        None => return default,
    };

    let w = extract_attr(tag, "width").and_then(|v| length_to_css_px(&v));
    let h = extract_attr(tag, "height").and_then(|v| length_to_css_px(&v));

    if let (Some(w), Some(h)) = (w, h) {
        if w > 0.0 && h > 0.0 {
            return SvgCssSize { width_px: w, height_px: h };
        }
    }

    if let Some((vw, vh)) = extract_attr(tag, "viewBox").and_then(|v| parse_viewbox(&v)) {
        return SvgCssSize { width_px: vw, height_px: vh };
    }

    default
}

/// 基于 SVG 尺寸与 DPI 计算输出像素尺寸
///
/// `max_dim_px` 为 0 时不钳制长边。结果保证至少 1×1。
pub fn compute_output_px(svg_text: &str, dpi: u32, max_dim_px: u32) -> (u32, u32) {
    let css = parse_svg_css_size(svg_text);
    let scale = f64::from(dpi) / 96.0;
    let mut w = ((css.width_px * scale).round() as u32).max(1);
    let mut h = ((css.height_px * scale).round() as u32).max(1);

    if max_dim_px > 0 {
        let mx = w.max(h);
        if mx > max_dim_px {
            let ratio = f64::from(max_dim_px) / f64::from(mx);
            w = ((f64::from(w) * ratio).round() as u32).max(1);
            h = ((f64::from(h) * ratio).round() as u32).max(1);
        }
    }
    (w, h)
}
