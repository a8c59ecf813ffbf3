//! SVG 转换模块
//!
//! # 设计思路
//!
//! 把"文本 → PNG"链路按职责拆分为三个子模块：
//!
//! - `svg_detect`：嗅探剪贴板文本是否为 SVG 标记（纯函数，无 IO）
//! - `svg_size`：解析 SVG 尺寸并按 DPI 计算输出像素
//! - `renderer`：调用外部 resvg 引擎并校验产物
//!
//! 嗅探刻意宽松（只看标签对），真正的解析错误由引擎报告；
//! 引擎被 `Rasterizer` trait 隔离，测试无需真实二进制。

pub mod renderer;
pub mod svg_detect;
pub mod svg_size;

pub use renderer::{
    find_resvg_exe, RenderRequest, RenderedPng, Rasterizer, ResvgRenderer, RESVG_PATH_ENV,
};
pub use svg_detect::{is_svg_markup, normalize_svg_markup};
pub use svg_size::compute_output_px;
