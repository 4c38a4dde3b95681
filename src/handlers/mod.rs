mod health;
pub mod messages;

pub use health::{health_check, stats};
pub use messages::{list_messages, send_message};
