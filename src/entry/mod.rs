//! Turning photo, text or manual input into committed meal records.

/// Image preprocessing boundary.
pub mod image;
/// Entry state machine.
pub mod pipeline;
/// Recognition service boundary.
pub mod recognition;

pub use image::{ImageLimits, ImagePreprocessor, PassthroughPreprocessor, PreparedImage, RawImage};
pub use pipeline::{
    Candidate, CaptureInput, EditTimestampPolicy, EntryError, EntryMode, EntryPipeline, MealSink,
    PipelineState, Submission,
};
pub use recognition::{Recognition, RecognitionFailure, RecognitionRequest, Recognizer, parse_recognition};
