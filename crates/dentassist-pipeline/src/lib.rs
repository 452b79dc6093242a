// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SmartNote pipeline: the user-visible orchestration layer.

pub mod pipeline;
pub mod prompt;
pub mod sanitize;
pub mod singleflight;

pub use pipeline::{
    NoteEvent, NoteStream, PipelineConfig, RequestContext, SmartNotePipeline, SummaryOutcome,
};
pub use sanitize::sanitize_input;
pub use singleflight::SingleFlight;
