//! Progress estimation.
//!
//! All progress callbacks - from whatever execution context the external
//! providers use - are funnelled through one [`ProgressEstimator`], which
//! serializes updates behind a single mutex and produces the monotonic
//! overall percentage a consumer can trust.

mod estimator;
mod throttle;

pub use estimator::{ProgressEstimator, WorkPlan};
pub use throttle::ProgressThrottle;
