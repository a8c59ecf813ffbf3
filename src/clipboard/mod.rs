//! 剪贴板管理模块
//!
//! # 设计思路
//!
//! 操作系统剪贴板是一个无法加应用级锁的全局单例（其他进程随时可能
//! 插入写入），所以全部访问都收拢在 `ClipboardPort` 接口之后：
//!
//! - **变化检测靠序列令牌**：每次剪贴板内容被替换，令牌单调递增。
//!   以令牌而非内容哈希做去重 —— 用户连续两次复制同一段 SVG
//!   是两个令牌，必须转换两次。
//! - **自写抑制**：流水线把 PNG 写回剪贴板后，监听器不能把这次
//!   写入当成新的用户复制。`SelfWriteSuppressor` 记录自写产生的
//!   令牌，下一次轮询看到正好这个令牌时只推进 `last_seen` 不触发转换。
//! - **可替换实现**：`SystemClipboard` 对接真实系统，`MemoryClipboard`
//!   是实现同一契约的内存假件，供测试使用。
//!
//! # 实现思路
//!
//! 抑制令牌的登记必须与轮询原子：流水线在仍持有剪贴板互斥锁时完成
//! `arm`，而 `poll` 同样要拿这把锁 —— 任何能观察到新令牌的轮询都
//! 必然发生在登记之后，不存在"看到自写令牌但抑制未武装"的窗口。

pub mod memory;
pub mod system;
pub mod watcher;

use std::sync::Mutex;

pub use memory::MemoryClipboard;
pub use system::SystemClipboard;
pub use watcher::{ClipboardWatcher, WatcherEvent};

use crate::error::ConvertError;

/// 剪贴板内容类别
///
/// 同时含文本与图片的多格式条目按文本归类（若文本嗅探为 SVG 则转换，
/// 否则跳过）—— 浏览器复制常常同时带预览图和标记文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    Text,
    Image,
    Other,
}

/// 一次轮询得到的剪贴板快照
///
/// 不可变，用完即弃；文本内容按需另取（`read_text`），
/// 避免每个轮询周期都搬运大段文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    /// 单调递增的变化序列令牌
    pub token: u64,
    pub kind: ClipboardKind,
}

/// 操作系统剪贴板的抽象端口
pub trait ClipboardPort: Send {
    /// 读取当前快照
    ///
    /// 永不无限阻塞；剪贴板被其他进程占用时返回上一次快照
    /// （令牌不变，调用方视作无事发生），而不是让监听器失败。
    fn poll(&mut self) -> ClipboardSnapshot;

    /// 读取文本内容；仅在快照类别为 `Text` 时调用
    fn read_text(&mut self) -> Option<String>;

    /// 用 PNG 替换剪贴板内容，返回写入后立即可见的序列令牌
    ///
    /// 写入对任何并发读者必须原子：不可观察到半空状态。
    fn write_image(&mut self, png_bytes: &[u8]) -> Result<u64, ConvertError>;
}

/// 自写抑制器
///
/// 记录流水线自己写入剪贴板产生的令牌；监听器在下一次轮询里
/// 消费它。一次 `arm` 只抵消一次轮询命中。
#[derive(Debug, Default)]
pub struct SelfWriteSuppressor {
    armed: Mutex<Option<u64>>,
}

impl SelfWriteSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记自写令牌（必须在释放剪贴板锁之前调用，见模块文档）
    pub fn arm(&self, token: u64) {
        let mut armed = self.lock_armed();
        if let Some(previous) = armed.replace(token) {
            // 上一次自写令牌从未被轮询观察到（例如外部写入紧随其后），直接覆盖。
            log::debug!("自写抑制令牌 {} 被 {} 覆盖", previous, token);
        }
        log::debug!("🚫 已登记自写抑制令牌: {}", token);
    }

    /// 若 `token` 正是登记的自写令牌则消费之并返回 true
    pub fn try_consume(&self, token: u64) -> bool {
        let mut armed = self.lock_armed();
        if *armed == Some(token) {
            *armed = None;
            return true;
        }
        false
    }

    fn lock_armed(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        match self.armed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("自写抑制锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppressor_consumes_exact_token_once() {
        let s = SelfWriteSuppressor::new();
        s.arm(7);
        assert!(s.try_consume(7));
        assert!(!s.try_consume(7));
    }

    #[test]
    fn suppressor_ignores_other_tokens() {
        let s = SelfWriteSuppressor::new();
        s.arm(7);
        assert!(!s.try_consume(8));
        // 未命中不消费，原令牌仍在
        assert!(s.try_consume(7));
    }

    #[test]
    fn rearm_overwrites_previous_token() {
        let s = SelfWriteSuppressor::new();
        s.arm(1);
        s.arm(2);
        assert!(!s.try_consume(1));
        assert!(s.try_consume(2));
    }
}
