//! Core types: event times, time input parsing, listing format, tracing

pub mod format;
pub mod input;
pub mod time;
pub mod tracing;

pub use format::{
    DESCRIPTION_LIMIT, DISAMBIGUATION_PREVIEW, EventSummary, ListingScope, format_event_time,
    render_disambiguation, render_listing, truncate_description,
};
pub use input::{ParsedTime, TimeParseError, parse_time_input};
pub use time::{EventTime, TimeWindow};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
