//! Session transcript and dashboard exports.

pub mod generator;

pub use generator::{
    generate_json_dashboard, generate_json_transcript, generate_markdown_dashboard,
    generate_markdown_transcript, write_output, Transcript, TranscriptMetadata,
};
