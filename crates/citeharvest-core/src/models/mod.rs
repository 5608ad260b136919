pub mod citation;
pub mod paper;
pub mod venue;

pub use citation::*;
pub use paper::*;
pub use venue::*;
