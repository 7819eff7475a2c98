//! 确认对话框接口（仅用于带未保存修改退出时）

use async_trait::async_trait;

#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// 返回 true 表示用户确认执行 `action_label` 对应的动作。
    async fn confirm(&self, title: &str, message: &str, action_label: &str) -> bool;
}
