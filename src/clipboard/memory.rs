//! 内存剪贴板假件
//!
//! # 设计思路
//!
//! 实现与 `SystemClipboard` 完全相同的 `ClipboardPort` 契约，
//! 供单元/集成测试在无图形环境下驱动监听器与流水线。
//! 关键语义与操作系统一致：**每次写入都递增令牌**，哪怕内容相同 ——
//! 连续复制两次同样的文本必须是两个令牌。

use crate::error::ConvertError;

use super::{ClipboardKind, ClipboardPort, ClipboardSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Content {
    Empty,
    Text(String),
    Image(Vec<u8>),
}

/// 测试用内存剪贴板
#[derive(Debug)]
pub struct MemoryClipboard {
    token: u64,
    content: Content,
    /// 为 true 时 `poll` 表现为"剪贴板被其他进程占用"
    locked: bool,
    last_snapshot: ClipboardSnapshot,
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self {
            token: 0,
            content: Content::Empty,
            locked: false,
            last_snapshot: ClipboardSnapshot {
                token: 0,
                kind: ClipboardKind::Other,
            },
        }
    }

    /// 模拟外部应用写入文本（令牌递增）
    pub fn set_text_external(&mut self, text: impl Into<String>) -> u64 {
        self.token += 1;
        self.content = Content::Text(text.into());
        self.token
    }

    /// 模拟剪贴板被占用/释放
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// 当前文本内容（供测试断言"转换失败时原文未被破坏"）
    pub fn current_text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(t) => Some(t),
            _ => None,
        }
    }

    /// 当前图片字节（供测试断言写入结果）
    pub fn current_image(&self) -> Option<&[u8]> {
        match &self.content {
            Content::Image(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn current_token(&self) -> u64 {
        self.token
    }
}

impl ClipboardPort for MemoryClipboard {
    fn poll(&mut self) -> ClipboardSnapshot {
        if self.locked {
            return self.last_snapshot;
        }
        let kind = match &self.content {
            Content::Text(_) => ClipboardKind::Text,
            Content::Image(_) => ClipboardKind::Image,
            Content::Empty => ClipboardKind::Other,
        };
        self.last_snapshot = ClipboardSnapshot {
            token: self.token,
            kind,
        };
        self.last_snapshot
    }

    fn read_text(&mut self) -> Option<String> {
        match &self.content {
            Content::Text(t) => Some(t.clone()),
            _ => None,
        }
    }

    fn write_image(&mut self, png_bytes: &[u8]) -> Result<u64, ConvertError> {
        if self.locked {
            return Err(ConvertError::Clipboard("剪贴板被占用".to_string()));
        }
        self.token += 1;
        self.content = Content::Image(png_bytes.to_vec());
        Ok(self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_writes_produce_distinct_tokens() {
        let mut cb = MemoryClipboard::new();
        let t1 = cb.set_text_external("<svg></svg>");
        let t2 = cb.set_text_external("<svg></svg>");
        assert_ne!(t1, t2);
    }

    #[test]
    fn locked_poll_returns_previous_snapshot() {
        let mut cb = MemoryClipboard::new();
        cb.set_text_external("a");
        let before = cb.poll();
        cb.set_locked(true);
        cb.set_text_external("b");
        assert_eq!(cb.poll(), before);
        cb.set_locked(false);
        assert_ne!(cb.poll(), before);
    }

    #[test]
    fn write_image_replaces_content_and_bumps_token() {
        let mut cb = MemoryClipboard::new();
        cb.set_text_external("<svg></svg>");
        let before = cb.poll().token;
        let token = cb.write_image(&[1, 2, 3]).unwrap();
        assert_eq!(token, before + 1);
        assert_eq!(cb.poll().kind, ClipboardKind::Image);
        assert!(cb.read_text().is_none());
    }
}
