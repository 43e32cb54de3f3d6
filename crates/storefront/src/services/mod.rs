//! External service clients.

pub mod mail;

pub use mail::{MailError, OtpMailer, OtpNotice, TransactionalMailer};
