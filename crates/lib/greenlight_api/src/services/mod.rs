//! Services used by the handlers.

pub mod mailer;
pub mod tokens;
