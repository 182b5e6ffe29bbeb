mod admin;
mod webhook;

pub use admin::health;
pub use webhook::telegram_webhook;
