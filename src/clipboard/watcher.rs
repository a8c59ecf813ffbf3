//! 剪贴板监听循环模块
//!
//! # 设计思路
//!
//! 一条专用轮询线程以固定间隔（100–250ms，配置层钳制）读取剪贴板
//! 快照，比较序列令牌判断变化；转换在单独的工作线程上执行
//! （有界池，容量 1 —— 转换稀少，串行化还能避免剪贴板写入竞争），
//! 轮询线程永不阻塞在引擎调用上，保证 `last_seen` 始终新鲜、
//! `stop()` 随时可响应。
//!
//! 并发规则：
//! - **同一时刻最多一个转换在途**。在途期间检测到的新变化只保留
//!   最新一条待转（中间的被丢弃 —— 只有最新剪贴板内容有意义）。
//! - **自写抑制**：流水线写回 PNG 时在剪贴板锁内武装抑制令牌，
//!   轮询看到正好该令牌时只推进 `last_seen` 不触发转换。
//! - **去重只认令牌**：连续复制两次相同 SVG 是两个令牌，转换两次；
//!   刻意不做内容哈希去重。
//! - `stop()` 后不再启动新转换，在途的引擎调用靠自身超时收尾，
//!   不做强制取消。
//!
//! # 实现思路
//!
//! - 每个轮询周期的动作由纯函数 `decide_tick_action` 决定，单测覆盖
//!   全部分支；线程只负责执行动作。
//! - 工作线程通过 mpsc 回报完成结果，轮询线程翻译为 `WatcherEvent`
//!   发给宿主（托盘/UI 壳挂接的接缝）。
//! - 启动时把当前剪贴板令牌记为已见，避免把启动前就躺在剪贴板里的
//!   内容误当新复制。

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::AppConfig;
use crate::convert::normalize_svg_markup;
use crate::error::ConvertError;
use crate::pipeline::{ConversionOutcome, ConversionPipeline};

use super::{ClipboardKind, ClipboardPort, SelfWriteSuppressor};

/// 监听器向宿主上报的事件
///
/// 被排除在核心外的托盘/UI 壳通过此通道消费状态与失败通知。
#[derive(Debug)]
pub enum WatcherEvent {
    /// 轮询已启动
    Listening,
    /// 轮询已停止
    Stopped,
    /// 一次转换成功（PNG 已在剪贴板上）
    Converted(ConversionOutcome),
    /// 一次转换失败，剪贴板原文保留
    ConversionFailed { message: String },
    /// 自动保存失败（剪贴板写入不受影响）
    AutoSaveFailed { message: String },
}

/// 单个轮询周期的决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// 令牌未变，无事发生
    Skip,
    /// 自写令牌：消费抑制，仅推进 `last_seen`
    SuppressSelf,
    /// 新变化但禁用中或非文本：仅推进 `last_seen`
    Advance,
    /// 新文本变化：读取并嗅探
    Inspect,
}

pub(crate) fn decide_tick_action(
    token_changed: bool,
    is_self_write: bool,
    enabled: bool,
    kind: ClipboardKind,
) -> TickAction {
    if !token_changed {
        return TickAction::Skip;
    }
    if is_self_write {
        return TickAction::SuppressSelf;
    }
    if !enabled || kind != ClipboardKind::Text {
        return TickAction::Advance;
    }
    TickAction::Inspect
}

enum Control {
    SetEnabled(bool),
    Stop,
}

/// 监听器自有状态
///
/// 构造于轮询线程内，只被该线程改写，线程退出即销毁 —— 没有环境全局。
struct WatcherState {
    enabled: bool,
    last_seen_token: u64,
    in_flight: bool,
    /// 在途期间到达的最新待转标记（旧的被覆盖丢弃）
    pending: Option<String>,
}

struct PollLoop {
    clipboard: Arc<Mutex<dyn ClipboardPort>>,
    suppressor: Arc<SelfWriteSuppressor>,
    settings: Arc<RwLock<AppConfig>>,
    events: Sender<WatcherEvent>,
    control_rx: Receiver<Control>,
    job_tx: Sender<String>,
    done_rx: Receiver<Result<ConversionOutcome, ConvertError>>,
    poll_interval: Duration,
    state: WatcherState,
}

impl PollLoop {
    fn lock_clipboard(&self) -> std::sync::MutexGuard<'_, dyn ClipboardPort + 'static> {
        match self.clipboard.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    fn max_svg_chars(&self) -> usize {
        match self.settings.read() {
            Ok(guard) => guard.max_svg_chars,
            Err(poisoned) => poisoned.into_inner().max_svg_chars,
        }
    }

    fn emit(&self, event: WatcherEvent) {
        if self.events.send(event).is_err() {
            log::debug!("事件接收端已关闭");
        }
    }

    fn dispatch(&mut self, markup: String) {
        if self.job_tx.send(markup).is_ok() {
            self.state.in_flight = true;
        } else {
            log::error!("转换工作线程已退出，无法派发任务");
        }
    }

    /// 处理工作线程回报的完成结果
    fn drain_completions(&mut self) {
        while let Ok(result) = self.done_rx.try_recv() {
            self.state.in_flight = false;
            match result {
                Ok(outcome) => {
                    if let Some(message) = outcome.save_error.clone() {
                        self.emit(WatcherEvent::AutoSaveFailed { message });
                    }
                    self.emit(WatcherEvent::Converted(outcome));
                }
                Err(err) => {
                    log::warn!("转换失败（剪贴板原文保留）: {}", err);
                    self.emit(WatcherEvent::ConversionFailed {
                        message: err.to_string(),
                    });
                }
            }
            // 在途期间积压的最新请求补转一次
            if let Some(markup) = self.state.pending.take() {
                if self.state.enabled {
                    log::debug!("补转在途期间到达的最新 SVG");
                    self.dispatch(markup);
                }
            }
        }
    }

    fn handle_tick(&mut self) {
        let snapshot = self.lock_clipboard().poll();

        let token_changed = snapshot.token != self.state.last_seen_token;
        let is_self_write = token_changed && self.suppressor.try_consume(snapshot.token);

        match decide_tick_action(token_changed, is_self_write, self.state.enabled, snapshot.kind) {
            TickAction::Skip => {}
            TickAction::SuppressSelf => {
                self.state.last_seen_token = snapshot.token;
                log::debug!("⏭️  跳过自写变化，令牌 {}", snapshot.token);
            }
            TickAction::Advance => {
                self.state.last_seen_token = snapshot.token;
            }
            TickAction::Inspect => {
                self.state.last_seen_token = snapshot.token;
                self.inspect_text();
            }
        }
    }

    fn inspect_text(&mut self) {
        let Some(text) = self.lock_clipboard().read_text() else {
            return;
        };
        let max_chars = self.max_svg_chars();
        if text.len() > max_chars {
            log::info!("剪贴板文本过大（{} 字符），跳过嗅探", text.len());
            return;
        }
        let Some(markup) = normalize_svg_markup(&text) else {
            return;
        };
        log::info!("📋 检测到 SVG 文本（{} 字符），令牌 {}", markup.len(), self.state.last_seen_token);
        if self.state.in_flight {
            // 只保留最新：上一个待转请求（若有）被此处覆盖丢弃
            self.state.pending = Some(markup);
        } else {
            self.dispatch(markup);
        }
    }

    fn run(mut self) {
        // 启动前已在剪贴板里的内容不算新复制
        let token = self.lock_clipboard().poll().token;
        self.state.last_seen_token = token;
        self.emit(WatcherEvent::Listening);
        log::info!("📋 剪贴板监听已启动（间隔 {}ms）", self.poll_interval.as_millis());

        let mut stop_requested = false;
        while !stop_requested {
            loop {
                match self.control_rx.try_recv() {
                    Ok(Control::SetEnabled(enabled)) => {
                        self.state.enabled = enabled;
                        log::info!("监听转换开关: {}", enabled);
                    }
                    Ok(Control::Stop) | Err(TryRecvError::Disconnected) => {
                        stop_requested = true;
                        break;
                    }
                    Err(TryRecvError::Empty) => break,
                }
            }
            if stop_requested {
                break;
            }

            self.drain_completions();
            self.handle_tick();
            thread::sleep(self.poll_interval);
        }

        self.emit(WatcherEvent::Stopped);
        log::info!("📋 剪贴板监听已停止");
        // job_tx 随 self 一起 drop，工作线程完成在途任务后自然退出
    }
}

struct Running {
    control_tx: Sender<Control>,
    poll_thread: JoinHandle<()>,
}

/// 剪贴板监听器
///
/// 拥有轮询线程与转换工作线程的生命周期；`start` 幂等，
/// `stop` 等待轮询线程退出（在途转换靠引擎超时自行收尾）。
pub struct ClipboardWatcher {
    clipboard: Arc<Mutex<dyn ClipboardPort>>,
    pipeline: Arc<ConversionPipeline>,
    suppressor: Arc<SelfWriteSuppressor>,
    settings: Arc<RwLock<AppConfig>>,
    events: Sender<WatcherEvent>,
    poll_interval: Duration,
    enabled: bool,
    running: Option<Running>,
}

impl ClipboardWatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clipboard: Arc<Mutex<dyn ClipboardPort>>,
        pipeline: Arc<ConversionPipeline>,
        suppressor: Arc<SelfWriteSuppressor>,
        settings: Arc<RwLock<AppConfig>>,
        events: Sender<WatcherEvent>,
        poll_interval: Duration,
        enabled: bool,
    ) -> Self {
        Self {
            clipboard,
            pipeline,
            suppressor,
            settings,
            events,
            poll_interval,
            enabled,
            running: None,
        }
    }

    /// 启动轮询；已在运行时无操作
    pub fn start(&mut self) {
        if self.running.is_some() {
            log::debug!("监听器已在运行，忽略重复启动");
            return;
        }

        let (control_tx, control_rx) = mpsc::channel();
        let (job_tx, job_rx) = mpsc::channel::<String>();
        let (done_tx, done_rx) = mpsc::channel();

        // 有界工作池（容量 1）：串行执行转换
        let pipeline = Arc::clone(&self.pipeline);
        thread::spawn(move || {
            for markup in job_rx {
                let result = pipeline.run(&markup);
                if done_tx.send(result).is_err() {
                    break;
                }
            }
        });

        let poll_loop = PollLoop {
            clipboard: Arc::clone(&self.clipboard),
            suppressor: Arc::clone(&self.suppressor),
            settings: Arc::clone(&self.settings),
            events: self.events.clone(),
            control_rx,
            job_tx,
            done_rx,
            poll_interval: self.poll_interval,
            state: WatcherState {
                enabled: self.enabled,
                last_seen_token: 0,
                in_flight: false,
                pending: None,
            },
        };
        let poll_thread = thread::spawn(move || poll_loop.run());

        self.running = Some(Running {
            control_tx,
            poll_thread,
        });
    }

    /// 停止轮询并等待轮询线程退出
    ///
    /// 在途转换不被强制取消（强杀引擎可能残留临时文件），
    /// 由其自身超时收尾；停止后不再有新转换启动。
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.control_tx.send(Control::Stop);
        if running.poll_thread.join().is_err() {
            log::error!("轮询线程异常退出");
        }
    }

    /// 切换转换开关
    ///
    /// 关闭后轮询照常进行（令牌持续推进），只是嗅探命中不再转换。
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if let Some(running) = &self.running {
            let _ = running.control_tx.send(Control::SetEnabled(enabled));
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for ClipboardWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
