//! # SVG → PNG Live — 库入口
//!
//! 监听系统剪贴板中的 SVG 标记文本，调用外部 resvg 引擎按配置的
//! DPI 与背景色光栅化为 PNG，并把结果写回剪贴板 —— 之后在任意
//! 应用里粘贴得到的是位图而不是标记文本。可选地把每次成功转换
//! 另存到磁盘目录。
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            宿主（main / 托盘壳，核心之外）                 │
//! │                 ↑ WatcherEvent 事件通道                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  clipboard::watcher ── 轮询循环 + 单工作线程                │
//! │       │  序列令牌变化检测 / 自写抑制 / 最新待转队列          │
//! │       ↓ 嗅探命中
//! │  pipeline ──────── 尺寸计算 → 光栅化 → 写回 → 自动保存      │
//! │       ├─ convert::svg_detect   SVG 文本嗅探（纯函数）       │
//! │       ├─ convert::svg_size     CSS 尺寸 × dpi/96           │
//! │       ├─ convert::renderer     resvg 子进程 + 超时 + 校验   │
//! │       ├─ clipboard (Port)      系统剪贴板 / 内存假件        │
//! │       └─ saver                 时间戳命名 + 原子写           │
//! │                                                          │
//! │  config ── JSON 设置持久化    error ── ConvertError 分类   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `ConvertError`，按恢复策略分层 |
//! | [`config`] | 用户设置加载/保存，轮询间隔钳制 |
//! | [`convert`] | SVG 嗅探、尺寸计算、resvg 引擎调用 |
//! | [`clipboard`] | 剪贴板端口、序列令牌、自写抑制、监听循环 |
//! | [`pipeline`] | 单次转换编排与失败收敛 |
//! | [`saver`] | 自动保存（尽力而为，不影响剪贴板写入） |

pub mod clipboard;
pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod saver;
