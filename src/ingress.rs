pub mod api_ext;
pub mod idempotency;
mod incoming;
pub mod rate_limiter;
mod sender;

pub use incoming::{read_multipart, IncomingAttachment, IncomingEmailRequest};
pub use sender::{domain_of, normalize_sender};
