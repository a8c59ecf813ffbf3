//! 监听器端到端测试
//!
//! 用内存剪贴板假件 + 罐装 PNG 假引擎驱动完整的
//! 轮询 → 嗅探 → 转换 → 写回链路，覆盖：
//! 自写抑制（恰好一次转换）、令牌去重（相同文本两次复制转换两次）、
//! 禁用态只推进令牌、引擎失败保留剪贴板原文、
//! 自动保存失败不影响剪贴板写入、在途期间只补转最新请求。

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, RwLock};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use svg_to_png_live::clipboard::{
    ClipboardPort, ClipboardWatcher, MemoryClipboard, SelfWriteSuppressor, WatcherEvent,
};
use svg_to_png_live::config::{AppConfig, BackgroundColor};
use svg_to_png_live::convert::{Rasterizer, RenderRequest, RenderedPng};
use svg_to_png_live::error::ConvertError;
use svg_to_png_live::pipeline::ConversionPipeline;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const RED_SVG: &str = r#"<svg width="10" height="10"><rect width="10" height="10" fill="red"/></svg>"#;

static TEST_DIR_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "svg-to-png-live-it-{}-{}",
        std::process::id(),
        TEST_DIR_SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}

fn encode_red_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("测试 PNG 编码不应失败");
    buf.into_inner()
}

/// 按请求尺寸返回纯红 PNG 的假引擎
struct FakeRasterizer {
    requests: Mutex<Vec<RenderRequest>>,
    fail: bool,
    delay: Duration,
}

impl FakeRasterizer {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            delay: Duration::ZERO,
        }
    }

    fn failing() -> Self {
        Self { fail: true, ..Self::new() }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::new() }
    }

    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_markup(&self) -> Option<String> {
        self.requests.lock().unwrap().last().map(|r| r.markup.clone())
    }
}

impl Rasterizer for FakeRasterizer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedPng, ConvertError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(ConvertError::Engine(
                "resvg 退出码 Some(1): SVG 解析失败".to_string(),
            ));
        }
        Ok(RenderedPng {
            bytes: encode_red_png(request.width_px, request.height_px),
            width: request.width_px,
            height: request.height_px,
        })
    }
}

struct Harness {
    clipboard: Arc<Mutex<MemoryClipboard>>,
    rasterizer: Arc<FakeRasterizer>,
    watcher: ClipboardWatcher,
    events: mpsc::Receiver<WatcherEvent>,
}

impl Harness {
    fn start(enabled: bool, config: AppConfig, rasterizer: FakeRasterizer) -> Self {
        let clipboard = Arc::new(Mutex::new(MemoryClipboard::new()));
        let port: Arc<Mutex<dyn ClipboardPort>> = clipboard.clone();
        let rasterizer = Arc::new(rasterizer);
        let suppressor = Arc::new(SelfWriteSuppressor::new());
        let settings = Arc::new(RwLock::new(config));
        let rasterizer_port: Arc<dyn Rasterizer> = rasterizer.clone();
        let pipeline = Arc::new(ConversionPipeline::new(
            rasterizer_port,
            port.clone(),
            suppressor.clone(),
            settings.clone(),
        ));

        let (event_tx, events) = mpsc::channel();
        let mut watcher = ClipboardWatcher::new(
            port,
            pipeline,
            suppressor,
            settings,
            event_tx,
            POLL_INTERVAL,
            enabled,
        );
        watcher.start();

        let harness = Self {
            clipboard,
            rasterizer,
            watcher,
            events,
        };
        // 等首次轮询完成（启动前的剪贴板内容不算新复制）
        harness.wait_listening();
        harness
    }

    fn wait_listening(&self) {
        loop {
            match self.events.recv_timeout(EVENT_TIMEOUT).expect("应收到 Listening 事件") {
                WatcherEvent::Listening => return,
                _ => continue,
            }
        }
    }

    fn copy_text(&self, text: &str) {
        self.clipboard.lock().unwrap().set_text_external(text);
    }

    fn wait_converted(&self) -> svg_to_png_live::pipeline::ConversionOutcome {
        loop {
            match self.events.recv_timeout(EVENT_TIMEOUT).expect("应收到 Converted 事件") {
                WatcherEvent::Converted(outcome) => return outcome,
                WatcherEvent::ConversionFailed { message } => {
                    panic!("期望转换成功，却失败了: {message}")
                }
                _ => continue,
            }
        }
    }

    fn wait_failed(&self) -> String {
        loop {
            match self.events.recv_timeout(EVENT_TIMEOUT).expect("应收到 ConversionFailed 事件") {
                WatcherEvent::ConversionFailed { message } => return message,
                WatcherEvent::Converted(_) => panic!("期望转换失败，却成功了"),
                _ => continue,
            }
        }
    }

    fn assert_no_conversion_within(&self, window: Duration) {
        let deadline = std::time::Instant::now() + window;
        while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            match self.events.recv_timeout(remaining) {
                Ok(WatcherEvent::Converted(_)) => panic!("不应发生转换"),
                Ok(_) => continue,
                Err(_) => return,
            }
        }
    }
}

#[test]
fn svg_copy_converts_exactly_once() {
    let mut h = Harness::start(true, AppConfig::default(), FakeRasterizer::new());
    h.copy_text(RED_SVG);

    let outcome = h.wait_converted();
    assert_eq!(h.rasterizer.call_count(), 1);

    // 剪贴板上已是 PNG，且像素 (5,5) 为不透明红色
    let png = h
        .clipboard
        .lock()
        .unwrap()
        .current_image()
        .expect("剪贴板应为图片")
        .to_vec();
    let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (outcome.width, outcome.height));
    assert_eq!(decoded.get_pixel(5, 5).0, [255, 0, 0, 255]);

    // 自写抑制：后续轮询看到自写令牌不得再次触发转换
    h.assert_no_conversion_within(Duration::from_millis(150));
    assert_eq!(h.rasterizer.call_count(), 1);
    h.watcher.stop();
}

#[test]
fn dpi_scale_doubles_output_dimensions() {
    let config = AppConfig { dpi: 192, ..AppConfig::default() };
    let mut h = Harness::start(true, config, FakeRasterizer::new());
    h.copy_text(RED_SVG);

    let outcome = h.wait_converted();
    assert_eq!((outcome.width, outcome.height), (20, 20));
    h.watcher.stop();
}

#[test]
fn dpi_96_is_native_size() {
    let config = AppConfig { dpi: 96, ..AppConfig::default() };
    let mut h = Harness::start(true, config, FakeRasterizer::new());
    h.copy_text(RED_SVG);

    let outcome = h.wait_converted();
    assert_eq!((outcome.width, outcome.height), (10, 10));
    h.watcher.stop();
}

#[test]
fn identical_copies_are_two_conversions() {
    // 去重只认令牌：同一文本复制两次必须转换两次
    let mut h = Harness::start(true, AppConfig::default(), FakeRasterizer::new());

    h.copy_text(RED_SVG);
    h.wait_converted();
    h.copy_text(RED_SVG);
    h.wait_converted();

    assert_eq!(h.rasterizer.call_count(), 2);
    h.watcher.stop();
}

#[test]
fn disabled_watcher_advances_tokens_without_converting() {
    let mut h = Harness::start(false, AppConfig::default(), FakeRasterizer::new());

    h.copy_text(RED_SVG);
    h.assert_no_conversion_within(Duration::from_millis(150));
    assert_eq!(h.rasterizer.call_count(), 0);
    // 原文仍在剪贴板
    assert_eq!(h.clipboard.lock().unwrap().current_text(), Some(RED_SVG));

    // 开启后旧令牌已被看过，不补转历史内容
    h.watcher.set_enabled(true);
    h.assert_no_conversion_within(Duration::from_millis(150));
    assert_eq!(h.rasterizer.call_count(), 0);

    // 新复制照常转换
    h.copy_text(RED_SVG);
    h.wait_converted();
    assert_eq!(h.rasterizer.call_count(), 1);
    h.watcher.stop();
}

#[test]
fn render_failure_leaves_clipboard_text_untouched() {
    let mut h = Harness::start(true, AppConfig::default(), FakeRasterizer::failing());
    h.copy_text(RED_SVG);

    let message = h.wait_failed();
    assert!(message.contains("引擎执行失败"));
    // 失败的转换绝不破坏用户复制的内容
    assert_eq!(h.clipboard.lock().unwrap().current_text(), Some(RED_SVG));

    // 监听循环在失败后继续存活
    h.copy_text(RED_SVG);
    h.wait_failed();
    assert_eq!(h.rasterizer.call_count(), 2);
    h.watcher.stop();
}

#[test]
fn non_svg_text_advances_without_conversion() {
    let mut h = Harness::start(true, AppConfig::default(), FakeRasterizer::new());

    h.copy_text("just mentioning svg in prose");
    h.assert_no_conversion_within(Duration::from_millis(150));
    assert_eq!(h.rasterizer.call_count(), 0);

    h.copy_text(RED_SVG);
    h.wait_converted();
    h.watcher.stop();
}

#[test]
fn auto_save_writes_png_next_to_conversion() {
    let dir = unique_temp_dir();
    let config = AppConfig {
        auto_save_enabled: true,
        auto_save_folder: Some(dir.clone()),
        ..AppConfig::default()
    };
    let mut h = Harness::start(true, config, FakeRasterizer::new());
    h.copy_text(RED_SVG);

    let outcome = h.wait_converted();
    let saved = outcome.saved_path.expect("应有保存路径");
    assert!(saved.starts_with(&dir));
    assert_eq!(fs::read(&saved).unwrap()[..8], [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n']);
    h.watcher.stop();
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn auto_save_failure_does_not_block_clipboard_write() {
    // 把"目录"指向一个已存在的普通文件，保存必然失败
    let dir = unique_temp_dir();
    fs::create_dir_all(&dir).unwrap();
    let blocker = dir.join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();

    let config = AppConfig {
        auto_save_enabled: true,
        auto_save_folder: Some(blocker),
        ..AppConfig::default()
    };
    let mut h = Harness::start(true, config, FakeRasterizer::new());
    h.copy_text(RED_SVG);

    let outcome = h.wait_converted();
    assert!(outcome.saved_path.is_none());
    assert!(outcome.save_error.is_some());
    // 剪贴板写入不受保存失败影响
    assert!(h.clipboard.lock().unwrap().current_image().is_some());
    h.watcher.stop();
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn in_flight_queue_keeps_only_latest_request() {
    let svg_a = r#"<svg width="11" height="11"></svg>"#;
    let svg_b = r#"<svg width="12" height="12"></svg>"#;
    let svg_c = r#"<svg width="13" height="13"></svg>"#;

    let config = AppConfig { dpi: 96, ..AppConfig::default() };
    let mut h = Harness::start(true, config, FakeRasterizer::slow(Duration::from_millis(300)));

    h.copy_text(svg_a);
    // 等首个请求进入引擎后，在途期间再复制两次
    while h.rasterizer.call_count() == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }
    h.copy_text(svg_b);
    std::thread::sleep(POLL_INTERVAL * 3);
    h.copy_text(svg_c);

    let first = h.wait_converted();
    let second = h.wait_converted();
    assert_eq!(first.width, 11);
    assert_eq!(second.width, 13);

    // 中间的 svg_b 被最新请求取代，总共恰好两次引擎调用
    assert_eq!(h.rasterizer.call_count(), 2);
    assert_eq!(h.rasterizer.last_markup().as_deref(), Some(svg_c));
    h.watcher.stop();
}

#[test]
fn stop_prevents_new_conversions() {
    let mut h = Harness::start(true, AppConfig::default(), FakeRasterizer::new());
    h.watcher.stop();
    assert!(!h.watcher.is_running());

    h.copy_text(RED_SVG);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(h.rasterizer.call_count(), 0);
    assert_eq!(h.clipboard.lock().unwrap().current_text(), Some(RED_SVG));
}

#[test]
fn background_color_flows_into_render_request() {
    let config = AppConfig {
        background_color: BackgroundColor::Transparent,
        ..AppConfig::default()
    };
    let mut h = Harness::start(true, config, FakeRasterizer::new());
    h.copy_text(RED_SVG);
    h.wait_converted();

    let requests = h.rasterizer.requests.lock().unwrap();
    assert_eq!(requests[0].background, BackgroundColor::Transparent);
    assert_eq!(requests[0].dpi, 300);
    drop(requests);
    h.watcher.stop();
}
