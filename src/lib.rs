pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod output;
pub mod pose;
pub mod tracker;
pub mod transform;

pub use error::AlignmentError;
pub use tracker::{AlignmentSession, SessionState};
pub use transform::RigidTransform;
