//! PNG 自动保存模块
//!
//! # 设计思路
//!
//! 每次成功转换可选地另存一份 PNG 到用户配置的目录。保存是尽力而为：
//! 失败（权限、磁盘）只上报不致命，绝不影响已完成的剪贴板写入。
//!
//! # 实现思路
//!
//! - 文件名 = 本地时间戳 + 进程内递增序号，已存在时换号重试，
//!   保证无碰撞；除 `.png` 扩展名外不承诺固定格式。
//! - 写入走"临时文件 + rename"两步，避免读者观察到半截文件。
//! - 目录不存在时自动创建。

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;

use crate::error::ConvertError;

static SAVE_SEQ: AtomicU64 = AtomicU64::new(0);
const NAME_RETRIES: u64 = 100;

/// 生成一个保存文件名（不含目录）
pub(crate) fn generate_png_filename(timestamp: &str, seq: u64) -> String {
    format!("svg_{timestamp}_{seq:04}.png")
}

/// 临时文件 + rename 的原子写
pub(crate) fn atomic_write_bytes(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_name = format!(
        ".{}.tmp.{}.{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "out.png".to_string()),
        std::process::id(),
        SAVE_SEQ.fetch_add(1, Ordering::Relaxed),
    );
    let tmp_path = parent.join(tmp_name);

    let result = fs::write(&tmp_path, data).and_then(|()| fs::rename(&tmp_path, path));
    if result.is_err() && tmp_path.exists() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// 将 PNG 字节保存到 `folder` 下的新文件，返回完整路径
pub fn save_png(png_bytes: &[u8], folder: &Path) -> Result<PathBuf, ConvertError> {
    fs::create_dir_all(folder)
        .map_err(|e| ConvertError::AutoSave(format!("创建保存目录 {} 失败: {e}", folder.display())))?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    for _ in 0..NAME_RETRIES {
        let seq = SAVE_SEQ.fetch_add(1, Ordering::Relaxed);
        let candidate = folder.join(generate_png_filename(&timestamp, seq));
        if candidate.exists() {
            continue;
        }
        atomic_write_bytes(&candidate, png_bytes)
            .map_err(|e| ConvertError::AutoSave(format!("写入 {} 失败: {e}", candidate.display())))?;
        log::info!("💾 已保存 {}（{} 字节）", candidate.display(), png_bytes.len());
        return Ok(candidate);
    }

    Err(ConvertError::AutoSave(format!(
        "在 {} 下未能生成不冲突的文件名",
        folder.display()
    )))
}
