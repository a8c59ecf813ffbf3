//! 系统剪贴板实现
//!
//! # 设计思路
//!
//! 基于 `arboard` 的跨平台剪贴板访问，序列令牌分平台处理：
//!
//! - **Windows**：直接使用操作系统的剪贴板序列号
//!   （`GetClipboardSequenceNumber`），每次内容替换都递增，
//!   无需打开剪贴板即可读取 —— 轮询在绝大多数周期里只有一次
//!   系统调用。
//! - **其他平台**：没有等价的系统计数器，用内容指纹推进的
//!   合成计数器代替。限制：连续两次复制完全相同的文本无法与
//!   一次复制区分（指纹不变），该语义只有 Windows 能完整保证。
//!
//! # 实现思路
//!
//! - `poll` 永不失败：剪贴板被其他进程占用时原样返回上一次快照。
//! - 写入前先完成全部昂贵工作（PNG 解码、RGBA 展开），
//!   与剪贴板交互的窗口尽量短；占用类失败做有限重试。
//! - 多格式条目取文本优先（详见 `clipboard` 模块文档）。

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

use crate::error::ConvertError;

use super::{ClipboardKind, ClipboardPort, ClipboardSnapshot};

const WRITE_RETRIES: u32 = 3;
const WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 真实系统剪贴板端口
pub struct SystemClipboard {
    inner: arboard::Clipboard,
    last_snapshot: ClipboardSnapshot,
    #[cfg(not(windows))]
    fallback: FallbackCounter,
}

#[cfg(not(windows))]
#[derive(Debug, Default)]
struct FallbackCounter {
    counter: u64,
    last_fingerprint: u64,
}

/// 剪贴板内容读取结果（内部）
enum Observed {
    Text(String),
    Image { width: usize, height: usize, byte_len: usize },
    Empty,
    /// 剪贴板被其他进程占用，本轮放弃
    Busy,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ConvertError> {
        let inner = arboard::Clipboard::new()
            .map_err(|e| ConvertError::Clipboard(format!("打开系统剪贴板失败: {e}")))?;
        Ok(Self {
            inner,
            last_snapshot: ClipboardSnapshot {
                token: 0,
                kind: ClipboardKind::Other,
            },
            #[cfg(not(windows))]
            fallback: FallbackCounter::default(),
        })
    }

    /// 读取当前内容概要，区分"占用"与"无内容"
    fn observe(&mut self) -> Observed {
        match self.inner.get_text() {
            Ok(text) if !text.is_empty() => return Observed::Text(text),
            Ok(_) | Err(arboard::Error::ContentNotAvailable) => {}
            Err(arboard::Error::ClipboardOccupied) => return Observed::Busy,
            Err(err) => {
                log::debug!("读取剪贴板文本失败: {}", err);
            }
        }
        match self.inner.get_image() {
            Ok(img) => Observed::Image {
                width: img.width,
                height: img.height,
                byte_len: img.bytes.len(),
            },
            Err(arboard::Error::ClipboardOccupied) => Observed::Busy,
            Err(arboard::Error::ContentNotAvailable) => Observed::Empty,
            Err(err) => {
                log::debug!("读取剪贴板图片失败: {}", err);
                Observed::Empty
            }
        }
    }

    #[cfg(windows)]
    fn os_sequence_token() -> u64 {
        // 无需打开剪贴板，系统保证每次内容替换后递增。
        u64::from(unsafe {
            windows::Win32::System::DataExchange::GetClipboardSequenceNumber()
        })
    }

    #[cfg(not(windows))]
    fn fingerprint(observed: &Observed) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match observed {
            Observed::Text(text) => {
                0u8.hash(&mut hasher);
                text.hash(&mut hasher);
            }
            Observed::Image { width, height, byte_len } => {
                1u8.hash(&mut hasher);
                (width, height, byte_len).hash(&mut hasher);
            }
            Observed::Empty | Observed::Busy => {
                2u8.hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// 写入成功后产生"写入后立即可见"的令牌
    fn token_after_write(&mut self, width: usize, height: usize, byte_len: usize) -> u64 {
        #[cfg(windows)]
        {
            let _ = (width, height, byte_len);
            Self::os_sequence_token()
        }
        #[cfg(not(windows))]
        {
            let fp = Self::fingerprint(&Observed::Image { width, height, byte_len });
            self.fallback.counter += 1;
            self.fallback.last_fingerprint = fp;
            self.fallback.counter
        }
    }
}

impl ClipboardPort for SystemClipboard {
    fn poll(&mut self) -> ClipboardSnapshot {
        #[cfg(windows)]
        {
            let token = Self::os_sequence_token();
            if token == self.last_snapshot.token {
                return self.last_snapshot;
            }
            // 令牌已变，才需要读内容归类；占用时本轮按无事发生处理。
            let kind = match self.observe() {
                Observed::Text(_) => ClipboardKind::Text,
                Observed::Image { .. } => ClipboardKind::Image,
                Observed::Empty => ClipboardKind::Other,
                Observed::Busy => return self.last_snapshot,
            };
            self.last_snapshot = ClipboardSnapshot { token, kind };
            self.last_snapshot
        }
        #[cfg(not(windows))]
        {
            let observed = self.observe();
            if matches!(observed, Observed::Busy) {
                return self.last_snapshot;
            }
            let fp = Self::fingerprint(&observed);
            if fp != self.fallback.last_fingerprint {
                self.fallback.counter += 1;
                self.fallback.last_fingerprint = fp;
            }
            let kind = match observed {
                Observed::Text(_) => ClipboardKind::Text,
                Observed::Image { .. } => ClipboardKind::Image,
                _ => ClipboardKind::Other,
            };
            self.last_snapshot = ClipboardSnapshot {
                token: self.fallback.counter,
                kind,
            };
            self.last_snapshot
        }
    }

    fn read_text(&mut self) -> Option<String> {
        match self.inner.get_text() {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                log::debug!("读取剪贴板文本失败: {}", err);
                None
            }
        }
    }

    fn write_image(&mut self, png_bytes: &[u8]) -> Result<u64, ConvertError> {
        // 昂贵工作前置：解码在进入剪贴板交互之前全部完成。
        let decoded = image::load_from_memory(png_bytes)
            .map_err(|e| ConvertError::Clipboard(format!("待写入 PNG 解码失败: {e}")))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let rgba = decoded.into_raw();
        let image_data = arboard::ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Borrowed(rgba.as_slice()),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.inner.set_image(image_data.clone()) {
                Ok(()) => break,
                Err(arboard::Error::ClipboardOccupied) if attempt < WRITE_RETRIES => {
                    log::debug!("剪贴板被占用，第 {} 次重试写入", attempt);
                    thread::sleep(WRITE_RETRY_DELAY);
                }
                Err(err) => {
                    return Err(ConvertError::Clipboard(format!(
                        "写入图片失败（第 {attempt} 次尝试）: {err}"
                    )));
                }
            }
        }

        let token = self.token_after_write(width as usize, height as usize, rgba.len());
        self.last_snapshot = ClipboardSnapshot {
            token,
            kind: ClipboardKind::Image,
        };
        log::info!("✅ PNG 已写入剪贴板 {}x{}，令牌 {}", width, height, token);
        Ok(token)
    }
}
