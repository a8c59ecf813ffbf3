// 防止在 Windows 发布版本中显示额外的控制台窗口，不要删除！
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

//! # SVG → PNG Live — 应用入口
//!
//! 本文件仅负责装配：日志、设置、引擎解析、剪贴板端口与监听器。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。
//! 托盘/设置 UI 壳不在核心范围内，这里以日志形式消费监听事件。

use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::time::Duration;

use svg_to_png_live::clipboard::{
    ClipboardPort, ClipboardWatcher, SelfWriteSuppressor, SystemClipboard, WatcherEvent,
};
use svg_to_png_live::config::AppConfig;
use svg_to_png_live::convert::{find_resvg_exe, Rasterizer, ResvgRenderer};
use svg_to_png_live::pipeline::ConversionPipeline;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("setup: begin");
    let config = AppConfig::load();
    let poll_interval = Duration::from_millis(config.effective_poll_interval_ms());
    let enabled = config.listen_enabled;
    log::info!(
        "setup: 设置已加载 dpi={} bg={} autoSave={} interval={}ms",
        config.dpi,
        config.background_color,
        config.auto_save_enabled,
        poll_interval.as_millis()
    );

    // 引擎缺失是启动期致命条件，不允许监听器带病启动
    let resvg_path = match find_resvg_exe() {
        Ok(path) => path,
        Err(err) => {
            log::error!("setup: {err}");
            std::process::exit(1);
        }
    };
    log::info!("setup: 引擎 {}", resvg_path.display());

    let clipboard: Arc<Mutex<dyn ClipboardPort>> = match SystemClipboard::new() {
        Ok(cb) => Arc::new(Mutex::new(cb)),
        Err(err) => {
            log::error!("setup: {err}");
            std::process::exit(1);
        }
    };

    let settings = Arc::new(RwLock::new(config));
    let suppressor = Arc::new(SelfWriteSuppressor::new());
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(ResvgRenderer::new(resvg_path));
    let pipeline = Arc::new(ConversionPipeline::new(
        Arc::clone(&rasterizer),
        Arc::clone(&clipboard),
        Arc::clone(&suppressor),
        Arc::clone(&settings),
    ));

    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = ClipboardWatcher::new(
        clipboard,
        pipeline,
        suppressor,
        settings,
        event_tx,
        poll_interval,
        enabled,
    );
    watcher.start();
    log::info!("setup: complete");

    for event in event_rx {
        match event {
            WatcherEvent::Listening => log::info!("状态: 监听中"),
            WatcherEvent::Stopped => {
                log::info!("状态: 已停止");
                break;
            }
            WatcherEvent::Converted(outcome) => {
                log::info!(
                    "已转换 {}×{}（{:.0}ms）{}",
                    outcome.width,
                    outcome.height,
                    outcome.render_ms,
                    outcome
                        .saved_path
                        .as_ref()
                        .map(|p| format!("，已保存 {}", p.display()))
                        .unwrap_or_default()
                );
            }
            WatcherEvent::ConversionFailed { message } => {
                log::warn!("转换失败（剪贴板原文保留）: {message}");
            }
            WatcherEvent::AutoSaveFailed { message } => {
                log::warn!("自动保存失败: {message}");
            }
        }
    }
}
