//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件形式持久化在用户配置目录下
//! （`<config_dir>/svg-to-png-live/config.json`），跨重启保留，
//! 字段采用 camelCase 便于人工检查与外部工具读取。
//!
//! 加载策略是宽容的：文件不存在、损坏或类型不符时回退默认值，
//! 未知字段忽略，缺失字段取默认 —— 设置文件永远不应阻止应用启动。
//!
//! # 实现思路
//!
//! - `AppConfig` 通过 `serde(default)` 实现逐字段缺省。
//! - 背景色用 `BackgroundColor` 枚举承载，序列化为
//!   `"#RRGGBB"` 或 `"transparent"` 字符串。
//! - 轮询间隔在读取侧统一钳制到允许区间，非法值不会进入监听循环。

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

const APP_DIR_NAME: &str = "svg-to-png-live";
const CONFIG_FILE_NAME: &str = "config.json";

pub const POLL_INTERVAL_DEFAULT_MS: u64 = 150;
pub const POLL_INTERVAL_MIN_MS: u64 = 100;
pub const POLL_INTERVAL_MAX_MS: u64 = 250;

/// 将轮询间隔钳制到允许区间
pub fn normalize_poll_interval_ms(value_ms: u64) -> u64 {
    value_ms.clamp(POLL_INTERVAL_MIN_MS, POLL_INTERVAL_MAX_MS)
}

/// 输出背景色：纯色或透明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackgroundColor {
    Transparent,
    Solid { r: u8, g: u8, b: u8 },
}

impl BackgroundColor {
    /// 输出 `#RRGGBB` 十六进制形式；透明时返回 `None`
    pub fn to_hex(self) -> Option<String> {
        match self {
            Self::Transparent => None,
            Self::Solid { r, g, b } => Some(format!("#{:02X}{:02X}{:02X}", r, g, b)),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let v = s.trim();
        if v.eq_ignore_ascii_case("transparent") || v.eq_ignore_ascii_case("none") {
            return Ok(Self::Transparent);
        }
        let hex = v.strip_prefix('#').unwrap_or(v);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConvertError::Config(format!(
                "背景色必须是 #RRGGBB 或 transparent，收到: {}",
                s
            )));
        }
        let parse = |range: std::ops::Range<usize>| -> u8 {
            u8::from_str_radix(&hex[range], 16).unwrap_or(0)
        };
        Ok(Self::Solid {
            r: parse(0..2),
            g: parse(2..4),
            b: parse(4..6),
        })
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_hex() {
            Some(hex) => f.write_str(&hex),
            None => f.write_str("transparent"),
        }
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map_err(|e: ConvertError| e.to_string())
    }
}

impl From<BackgroundColor> for String {
    fn from(value: BackgroundColor) -> Self {
        value.to_string()
    }
}

/// 用户可配置设置
///
/// 每次流水线运行开始时取一份只读快照，运行中途不再刷新，
/// 保证单次转换内部一致（用户并发改设置不会撕裂一次转换）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// 目标分辨率，按 `dpi / 96` 缩放 SVG 的 CSS 像素尺寸
    pub dpi: u32,
    /// 输出背景色（`"#RRGGBB"` 或 `"transparent"`）
    pub background_color: BackgroundColor,
    /// 是否在启动时开启监听
    pub listen_enabled: bool,
    /// 是否将每次成功转换另存到磁盘
    pub auto_save_enabled: bool,
    /// 自动保存目录；`None` 时即使开启自动保存也跳过
    pub auto_save_folder: Option<PathBuf>,
    /// 剪贴板轮询间隔（毫秒），读取侧钳制到 100–250
    pub poll_interval_ms: u64,
    /// 单次引擎调用的硬超时（秒）
    pub conversion_timeout_s: u64,
    /// 剪贴板文本长度上限；超过则不进入嗅探，保护响应性
    pub max_svg_chars: usize,
    /// 输出长边像素上限；0 表示不钳制
    pub max_output_dim_px: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            background_color: BackgroundColor::Solid {
                r: 0xFF,
                g: 0xFF,
                b: 0xFF,
            },
            listen_enabled: false,
            auto_save_enabled: false,
            auto_save_folder: None,
            poll_interval_ms: POLL_INTERVAL_DEFAULT_MS,
            conversion_timeout_s: 30,
            max_svg_chars: 200_000_000,
            max_output_dim_px: 16_384,
        }
    }
}

/// 设置文件路径
pub fn config_file_path() -> Result<PathBuf, ConvertError> {
    let base = dirs::config_dir()
        .ok_or_else(|| ConvertError::Config("无法确定用户配置目录".to_string()))?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// 从磁盘加载设置；任何失败都回退默认值
    pub fn load() -> Self {
        let path = match config_file_path() {
            Ok(p) => p,
            Err(err) => {
                log::warn!("配置路径不可用，使用默认设置: {}", err);
                return Self::default();
            }
        };
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Self>(&content) {
                Ok(cfg) => cfg,
                Err(err) => {
                    log::warn!("解析配置文件失败，使用默认设置: {}", err);
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!("读取配置文件失败，使用默认设置: {}", err);
                Self::default()
            }
        }
    }

    /// 持久化设置到磁盘
    pub fn save(&self) -> Result<(), ConvertError> {
        let path = config_file_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConvertError::Config(format!("序列化设置失败: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 监听循环实际使用的轮询间隔（已钳制）
    pub fn effective_poll_interval_ms(&self) -> u64 {
        normalize_poll_interval_ms(self.poll_interval_ms)
    }
}
