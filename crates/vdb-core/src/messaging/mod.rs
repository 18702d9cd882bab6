//! Cross-messenger abstractions (Telegram today; other backends later).

pub mod port;
pub mod types;
