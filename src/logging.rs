// ==========================================
// 日志系统初始化
// ==========================================
// 使用 tracing 和 tracing-subscriber
// 支持环境变量配置日志级别
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info）
///   例如: RUST_LOG=debug 或 RUST_LOG=protection_settings_sync::engine=debug
///
/// # 示例
/// ```no_run
/// use protection_settings_sync::logging;
/// logging::init();
/// ```
pub fn init() {
    fmt()
        .with_env_filter(default_filter())
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();
}

/// 初始化 JSON 格式日志（供日志采集使用）
pub fn init_json() {
    fmt()
        .json()
        .with_env_filter(default_filter())
        .with_current_span(false)
        .init();
}

/// 初始化测试环境的日志系统
///
/// 使用更详细的日志级别，便于调试
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
