//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `ConvertError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)` 等不一致模式。
//! 错误按恢复策略分层：
//!
//! - `EngineMissing`：启动期致命，监听器不允许启动；
//! - `Engine` / `OutputInvalid`：单次转换失败，可恢复，剪贴板原文保留；
//! - `Clipboard`：剪贴板读写失败（瞬时占用在端口内部重试，重试耗尽才上抛）；
//! - `AutoSave`：自动保存失败，不影响剪贴板写入结果。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息，引擎诊断文本原样携带。
//! - 所有单次转换错误在流水线边界被捕获并转为事件上报，
//!   绝不以未捕获异常的形式杀死监听循环。

/// 应用级统一错误类型
///
/// 转换链路上的所有失败最终都收敛到此类型。
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// 光栅化引擎（resvg）未找到 —— 启动期致命条件
    #[error("未找到 resvg 引擎: {0}")]
    EngineMissing(String),

    /// 引擎执行失败（非零退出 / 超时），附带引擎原始诊断文本
    #[error("引擎执行失败: {0}")]
    Engine(String),

    /// 引擎产出的字节不是合法 PNG
    #[error("引擎输出无效: {0}")]
    OutputInvalid(String),

    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 自动保存失败（不影响剪贴板写入）
    #[error("自动保存失败: {0}")]
    AutoSave(String),

    /// 配置读写失败
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
}
