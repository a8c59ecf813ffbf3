//! 光栅化引擎调用模块
//!
//! # 设计思路
//!
//! SVG 光栅化委托给外部 `resvg` 命令行程序（保真度与性能都优于自绘）。
//! 引擎位置在启动期解析一次，找不到视为启动致命条件
//! （`ConvertError::EngineMissing`），而不是每次转换时失败。
//!
//! 调用契约：标记通过临时文件传入，DPI、输出尺寸与背景色全部以显式
//! 参数传递，绝不依赖引擎默认值。执行受硬超时约束；超时或非零退出
//! 统一映射为 `ConvertError::Engine`，引擎诊断文本原样携带给上层展示。
//! 产出字节必须通过 PNG 魔数与尺寸校验，否则为 `OutputInvalid`。
//!
//! # 实现思路
//!
//! - `Rasterizer` trait 作为接缝，测试里用返回罐装 PNG 的假引擎替换。
//! - 不同版本的 resvg 支持的参数不同，首次调用时通过 `--help`
//!   探测能力并缓存（`once_cell::sync::OnceCell`）。
//! - 超时用 `try_wait` 截止循环实现，到点 kill 子进程；
//!   stdout/stderr 由独立线程读取，避免管道写满导致死锁。
//! - 引擎不支持 `--background` 时，在本进程内用 `image` crate
//!   做纯色底合成，保证背景语义与设置一致。

use std::env;
use std::fs;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use image::{ImageFormat, ImageReader, Rgba, RgbaImage};
use once_cell::sync::OnceCell;

use crate::config::BackgroundColor;
use crate::error::ConvertError;

/// 引擎路径环境变量覆盖
pub const RESVG_PATH_ENV: &str = "SVG_TO_PNG_LIVE_RESVG_PATH";

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(10);

static WORKSPACE_SEQ: AtomicU64 = AtomicU64::new(0);

/// 单次光栅化请求
///
/// 每次检测到变化时重新构建，无共享可变状态。
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub markup: String,
    /// 目标 DPI（缩放比 = dpi / 96）
    pub dpi: u32,
    pub background: BackgroundColor,
    /// 期望输出宽度（像素），由 `svg_size` 预先计算
    pub width_px: u32,
    pub height_px: u32,
    pub timeout: Duration,
}

/// 校验通过的光栅化产物
#[derive(Debug, Clone)]
pub struct RenderedPng {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// 光栅化能力接缝
///
/// 流水线只依赖此 trait，测试中用罐装 PNG 的假实现替换真实引擎。
pub trait Rasterizer: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedPng, ConvertError>;
}

/// resvg 命令行参数能力
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ResvgCaps {
    pub width: bool,
    pub height: bool,
    pub zoom: bool,
    pub dpi: bool,
    pub background: bool,
}

pub(crate) fn parse_caps_from_help(help_text: &str) -> ResvgCaps {
    ResvgCaps {
        width: help_text.contains("--width"),
        height: help_text.contains("--height"),
        zoom: help_text.contains("--zoom"),
        dpi: help_text.contains("--dpi"),
        background: help_text.contains("--background"),
    }
}

/// 根据能力与请求构建尺寸/背景参数（不含输入输出路径）
pub(crate) fn build_render_args(caps: &ResvgCaps, request: &RenderRequest) -> Vec<String> {
    let mut args = Vec::new();
    if caps.dpi {
        args.push("--dpi".to_string());
        args.push(request.dpi.to_string());
    }
    if caps.width && caps.height {
        args.push("--width".to_string());
        args.push(request.width_px.to_string());
        args.push("--height".to_string());
        args.push(request.height_px.to_string());
    } else if caps.zoom {
        let zoom = f64::from(request.dpi) / 96.0;
        args.push("--zoom".to_string());
        args.push(format!("{zoom:.6}"));
    }
    if caps.background {
        if let Some(hex) = request.background.to_hex() {
            args.push("--background".to_string());
            args.push(hex);
        }
    }
    args
}

fn engine_exe_name() -> &'static str {
    if cfg!(windows) { "resvg.exe" } else { "resvg" }
}

/// 解析 resvg 可执行文件位置
///
/// 顺序：环境变量覆盖 → 可执行文件旁的 `vendor/resvg/` → `PATH`。
/// 全部落空时返回 `EngineMissing`，调用方应将其视为启动失败。
pub fn find_resvg_exe() -> Result<PathBuf, ConvertError> {
    if let Ok(override_path) = env::var(RESVG_PATH_ENV) {
        let p = PathBuf::from(&override_path);
        if p.is_file() {
            return Ok(p);
        }
        return Err(ConvertError::EngineMissing(format!(
            "{RESVG_PATH_ENV} 指向不存在的文件: {override_path}"
        )));
    }

    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("vendor").join("resvg").join(engine_exe_name());
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(engine_exe_name());
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(ConvertError::EngineMissing(format!(
        "未在 vendor/resvg/ 或 PATH 中找到 {}，也可通过 {} 指定",
        engine_exe_name(),
        RESVG_PATH_ENV
    )))
}

/// PNG 魔数 + 可解码尺寸校验
pub(crate) fn validate_png(bytes: &[u8]) -> Result<(u32, u32), ConvertError> {
    if bytes.len() < PNG_MAGIC.len() || bytes[..PNG_MAGIC.len()] != PNG_MAGIC {
        return Err(ConvertError::OutputInvalid(
            "引擎输出缺少 PNG 魔数".to_string(),
        ));
    }
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ConvertError::OutputInvalid(format!("无法识别输出格式: {e}")))?
        .into_dimensions()
        .map_err(|e| ConvertError::OutputInvalid(format!("无法读取输出尺寸: {e}")))
}

/// 将透明 PNG 合成到纯色底上
pub(crate) fn apply_solid_background(
    png_bytes: &[u8],
    r: u8,
    g: u8,
    b: u8,
) -> Result<Vec<u8>, ConvertError> {
    let decoded = image::load_from_memory(png_bytes)
        .map_err(|e| ConvertError::OutputInvalid(format!("输出解码失败: {e}")))?
        .to_rgba8();
    let (w, h) = decoded.dimensions();

    let mut composed = RgbaImage::new(w, h);
    for (x, y, pixel) in decoded.enumerate_pixels() {
        let a = u32::from(pixel[3]);
        let blend = |fg: u8, bg: u8| -> u8 {
            ((u32::from(fg) * a + u32::from(bg) * (255 - a)) / 255) as u8
        };
        composed.put_pixel(x, y, Rgba([blend(pixel[0], r), blend(pixel[1], g), blend(pixel[2], b), 255]));
    }

    let mut buf = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(composed)
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| ConvertError::OutputInvalid(format!("合成底色后重编码失败: {e}")))?;
    Ok(buf.into_inner())
}

struct EngineOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// RAII 临时工作目录，Drop 时尽力清理
struct TempWorkspace {
    dir: PathBuf,
}

impl TempWorkspace {
    fn create() -> Result<Self, ConvertError> {
        let seq = WORKSPACE_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!(
            "svg-to-png-live-{}-{}",
            std::process::id(),
            seq
        ));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            log::debug!("清理临时目录 {} 失败: {}", self.dir.display(), err);
        }
    }
}

fn spawn_pipe_reader(pipe: Option<impl Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// 带硬超时地执行子进程并收集输出
///
/// 到达截止时间后 kill 子进程（不做更细粒度的取消 —— 强杀比
/// 悬挂更可控，临时文件由工作目录统一回收）。
fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<EngineOutput, ConvertError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ConvertError::Engine(format!("启动引擎进程失败: {e}")))?;

    let stdout_reader = spawn_pipe_reader(child.stdout.take());
    let stderr_reader = spawn_pipe_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ConvertError::Engine(format!(
                        "渲染超时（{:.1}s），可在设置中调大转换超时",
                        timeout.as_secs_f64()
                    )));
                }
                thread::sleep(CHILD_POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                return Err(ConvertError::Engine(format!("等待引擎进程失败: {err}")));
            }
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    Ok(EngineOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

/// `resvg` 命令行的薄封装
pub struct ResvgRenderer {
    exe: PathBuf,
    caps: OnceCell<ResvgCaps>,
}

impl ResvgRenderer {
    pub fn new(exe: PathBuf) -> Self {
        Self {
            exe,
            caps: OnceCell::new(),
        }
    }

    /// 探测引擎支持的参数（结果缓存，进程生命周期内只探测一次）
    fn caps(&self) -> ResvgCaps {
        *self.caps.get_or_init(|| {
            let mut cmd = Command::new(&self.exe);
            cmd.arg("--help");
            let help_text = match run_with_timeout(cmd, PROBE_TIMEOUT) {
                Ok(out) => format!("{}\n{}", out.stdout, out.stderr),
                Err(err) => {
                    log::warn!("探测引擎能力失败，按最小能力集处理: {}", err);
                    String::new()
                }
            };
            let caps = parse_caps_from_help(&help_text);
            log::info!(
                "🔍 引擎能力: width={} height={} zoom={} dpi={} background={}",
                caps.width, caps.height, caps.zoom, caps.dpi, caps.background
            );
            caps
        })
    }
}

impl Rasterizer for ResvgRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedPng, ConvertError> {
        let caps = self.caps();
        let workspace = TempWorkspace::create()?;
        let in_svg = workspace.path("in.svg");
        let out_png = workspace.path("out.png");
        fs::write(&in_svg, &request.markup)?;

        let mut cmd = Command::new(&self.exe);
        cmd.args(build_render_args(&caps, request));
        cmd.arg(&in_svg).arg(&out_png);

        let output = run_with_timeout(cmd, request.timeout)?;
        if output.code != Some(0) || !out_png.exists() {
            let diagnostic = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(ConvertError::Engine(format!(
                "resvg 退出码 {:?}: {}",
                output.code, diagnostic
            )));
        }

        let mut bytes = fs::read(&out_png)?;
        // 先校验引擎原始产物，再做可选的底色合成
        validate_png(&bytes)?;
        if !caps.background {
            if let BackgroundColor::Solid { r, g, b } = request.background {
                bytes = apply_solid_background(&bytes, r, g, b)?;
            }
        }

        let (width, height) = validate_png(&bytes)?;
        if (width, height) != (request.width_px, request.height_px) {
            log::warn!(
                "引擎输出尺寸 {}x{} 与请求 {}x{} 不一致，按实际尺寸继续",
                width, height, request.width_px, request.height_px
            );
        }

        Ok(RenderedPng { bytes, width, height })
    }
}
