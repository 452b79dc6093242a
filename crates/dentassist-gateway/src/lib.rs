// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/SSE surface of the dental assistant backend.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod limit;
pub mod metrics;
pub mod ratelimit;
pub mod server;
pub mod state;
pub mod trace;

pub use error::ApiError;
pub use metrics::MetricsCollector;
pub use ratelimit::{classify, EndpointGroup, RateLimiter};
pub use server::{router, serve};
pub use state::GatewayState;
pub use trace::RequestId;
