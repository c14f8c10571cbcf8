//! Email transport adapters.

mod resend_mailer;

pub use resend_mailer::{ResendConfig, ResendMailer};
