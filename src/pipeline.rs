//! 转换流水线模块
//!
//! # 设计思路
//!
//! 对一次已检测到的剪贴板变化编排完整转换：
//! 尺寸计算 → 引擎光栅化 → 写回剪贴板 → 可选自动保存。
//!
//! 失败策略是刻意的：引擎失败时剪贴板**原封不动**（用户复制的
//! SVG 文本仍在），失败作为结构化结果上报给 UI 层展示；
//! 自动保存失败不回滚也不影响剪贴板写入 —— 两个副作用相互独立，
//! 各自尽力上报。
//!
//! # 实现思路
//!
//! - 设置在 `run` 入口取一次只读快照，运行中途绝不刷新，
//!   用户并发改设置不会撕裂单次转换。
//! - 剪贴板写入与自写抑制登记在同一把剪贴板锁内完成
//!   （原子性论证见 `clipboard` 模块文档）。
//! - 所有失败在此边界收敛为 `Result`，监听循环永不被转换失败杀死。

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::clipboard::{ClipboardPort, SelfWriteSuppressor};
use crate::config::AppConfig;
use crate::convert::{compute_output_px, Rasterizer, RenderRequest};
use crate::error::ConvertError;
use crate::saver;

/// 一次成功转换的结果
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub width: u32,
    pub height: u32,
    pub render_ms: f64,
    /// 自写产生的序列令牌（已登记进抑制器）
    pub clipboard_token: u64,
    pub saved_path: Option<PathBuf>,
    /// 自动保存失败时的描述（保存失败不致命）
    pub save_error: Option<String>,
}

/// 嗅探命中后的单次转换编排器
pub struct ConversionPipeline {
    rasterizer: Arc<dyn Rasterizer>,
    clipboard: Arc<Mutex<dyn ClipboardPort>>,
    suppressor: Arc<SelfWriteSuppressor>,
    settings: Arc<RwLock<AppConfig>>,
}

impl ConversionPipeline {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        clipboard: Arc<Mutex<dyn ClipboardPort>>,
        suppressor: Arc<SelfWriteSuppressor>,
        settings: Arc<RwLock<AppConfig>>,
    ) -> Self {
        Self {
            rasterizer,
            clipboard,
            suppressor,
            settings,
        }
    }

    fn settings_snapshot(&self) -> AppConfig {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("设置锁中毒，继续使用恢复数据");
                poisoned.into_inner().clone()
            }
        }
    }

    /// 执行一次转换
    ///
    /// 引擎失败时不触碰剪贴板；成功时先写剪贴板（并武装自写抑制），
    /// 再尽力自动保存。
    pub fn run(&self, markup: &str) -> Result<ConversionOutcome, ConvertError> {
        let settings = self.settings_snapshot();
        let (width_px, height_px) =
            compute_output_px(markup, settings.dpi, settings.max_output_dim_px);

        let request = RenderRequest {
            markup: markup.to_string(),
            dpi: settings.dpi,
            background: settings.background_color,
            width_px,
            height_px,
            timeout: Duration::from_secs(settings.conversion_timeout_s.max(1)),
        };

        let t0 = Instant::now();
        let rendered = self.rasterizer.render(&request)?;
        let render_ms = t0.elapsed().as_secs_f64() * 1000.0;

        let clipboard_token = {
            let mut clipboard = match self.clipboard.lock() {
                Ok(guard) => guard,
                Err(poisoned) => {
                    log::warn!("剪贴板锁中毒，继续使用恢复数据");
                    poisoned.into_inner()
                }
            };
            let token = clipboard.write_image(&rendered.bytes)?;
            // 持锁登记：任何能看到新令牌的轮询必然发生在这之后
            self.suppressor.arm(token);
            token
        };

        let (saved_path, save_error) = self.auto_save(&settings, &rendered.bytes);

        log::info!(
            "✅ 转换完成 {}x{} dpi={} bg={} 耗时 {:.0}ms 令牌 {}",
            rendered.width,
            rendered.height,
            settings.dpi,
            settings.background_color,
            render_ms,
            clipboard_token
        );

        Ok(ConversionOutcome {
            width: rendered.width,
            height: rendered.height,
            render_ms,
            clipboard_token,
            saved_path,
            save_error,
        })
    }

    fn auto_save(
        &self,
        settings: &AppConfig,
        png_bytes: &[u8],
    ) -> (Option<PathBuf>, Option<String>) {
        if !settings.auto_save_enabled {
            return (None, None);
        }
        let Some(folder) = settings.auto_save_folder.as_deref() else {
            log::debug!("自动保存已开启但未配置目录，跳过");
            return (None, None);
        };
        match saver::save_png(png_bytes, folder) {
            Ok(path) => (Some(path), None),
            Err(err) => {
                log::warn!("⚠️ 自动保存失败（剪贴板写入不受影响）: {}", err);
                (None, Some(err.to_string()))
            }
        }
    }
}
