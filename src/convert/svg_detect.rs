//! SVG 文本嗅探模块
//!
//! # 设计思路
//!
//! 判断剪贴板文本是否为 SVG 标记：必须同时出现 `<svg` 开标签和
//! `</svg>` 闭标签（大小写不敏感），前置的 BOM / 空白 / XML 声明 /
//! DOCTYPE / 注释都被容忍。只提到 "svg" 字样的普通文本必须被拒绝。
//!
//! 刻意不做完整 XML 校验：标签结构吻合但内容畸形的输入照常放行，
//! 真正的解析错误交给光栅化引擎报告。
//!
//! # 实现思路
//!
//! - 正则通过 `once_cell::sync::Lazy` 首次调用时编译，后续零成本复用。
//! - `normalize_svg_markup` 截取首个 `<svg` 到最后一个 `</svg>` 的子串，
//!   剥掉前后包裹的网页杂质（HTML 片段、说明文字等）。

use once_cell::sync::Lazy;
use regex::Regex;

static SVG_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<svg\b").expect("SVG 开标签正则应当合法"));
static SVG_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</svg\s*>").expect("SVG 闭标签正则应当合法"));

/// 判断文本是否为 SVG 标记
///
/// 开闭标签都存在才算命中；只要求闭标签能显著降低误报
/// （例如讨论 svg 的聊天记录、含 `<svg` 字样的代码片段）。
pub fn is_svg_markup(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let open = match SVG_OPEN_RE.find(text) {
        Some(m) => m,
        None => return false,
    };
    SVG_CLOSE_RE
        .find_iter(text)
        .last()
        .is_some_and(|close| close.end() > open.start())
}

/// 提取规范化的 SVG 子串
///
/// 返回从首个 `<svg` 到最后一个 `</svg>`（含）的去空白子串；
/// 输入不含可信 SVG 文档时返回 `None`。
pub fn normalize_svg_markup(text: &str) -> Option<String> {
    if !is_svg_markup(text) {
        return None;
    }
    let start = SVG_OPEN_RE.find(text)?.start();
    let end = SVG_CLOSE_RE.find_iter(text).last()?.end();
    let svg = text[start..end].trim();
    if svg.is_empty() {
        return None;
    }
    Some(svg.to_string())
}
