//! checkwatch-notify — alert delivery.
//!
//! Delivery is best-effort: a failed send is logged and dropped, never
//! retried and never propagated to the reconciler.

pub mod mailer;

pub use mailer::{NotifyError, SmtpNotifier};
