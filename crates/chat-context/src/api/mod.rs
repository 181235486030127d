//! Provider wire formats.
//!
//! - [`anthropic`]: Messages API shapes, the `to_wire` / `from_wire`
//!   conversion, and [`RemoteContextEditor`](anthropic::RemoteContextEditor),
//!   the HTTP client behind the provider-edit strategy.
//!
//! The summarization model client lives at the crate root as
//! [`OpenRouterClient`](crate::OpenRouterClient).

pub mod anthropic;
