pub mod client;
pub mod retry;

pub use client::{ApiResponse, HttpSession, RequestSpec, SessionConfig};
pub use retry::{RetryConfig, RetryPolicy};
