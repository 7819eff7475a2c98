//! 通知接口
//!
//! 成功 / 失败提示只做上报，不影响调用结果。

use tracing::{error, info};

/// 通知接收方。
pub trait Notifier: Send + Sync {
    fn report_success(&self, message: &str);

    fn report_error(&self, message: &str, cause: &(dyn std::error::Error + 'static));
}

/// 以 tracing 事件输出通知。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn report_success(&self, message: &str) {
        info!(target: "dms.notify", "{}", message);
    }

    fn report_error(&self, message: &str, cause: &(dyn std::error::Error + 'static)) {
        error!(target: "dms.notify", cause = %cause, "{}", message);
    }
}

/// 上报一次失败并计数（每个失败只调用一次）。
pub(crate) fn report_failure(
    notifier: &dyn Notifier,
    message: &str,
    err: &crate::error::SessionError,
) {
    tracing::warn!(target: "dms.workset", error = %err, "{}", message);
    dms_telemetry::record_error_reported();
    notifier.report_error(message, err);
}
