pub mod session;
pub mod smooth;
pub mod solver;

pub use session::{AlignmentSession, SessionState, SessionStats};
pub use smooth::{LandmarkSmoother, TransformSmoother};
pub use solver::TransformSolver;
