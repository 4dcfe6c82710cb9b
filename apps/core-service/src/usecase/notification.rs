//! # 通知ユースケース

mod service;
mod template_renderer;

pub use service::NotificationService;
pub use template_renderer::TemplateRenderer;
