//! # External Collaborators
//!
//! Narrow trait interfaces for the pieces this crate deliberately treats as
//! out-of-scope collaborators: the ingest process, the classifier/SSD model
//! inference, and the outbound messaging transport. The Controller is
//! generic over these traits so the pipeline can be driven by fakes in
//! tests without ever implementing real decoding or inference here.

mod classifier;
mod ingest;
mod transport;

pub use classifier::{ClassifiedCrop, Classifier, DetectFullFrame, SsdDetection, SsdDetector};
pub use ingest::{DecodedFrame, FrameSource};
pub use transport::MessageTransport;
