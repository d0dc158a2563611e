pub mod author;
pub mod candidate;
pub mod clock;
pub mod config;
pub mod error;
pub mod schedule;

pub use author::*;
pub use candidate::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use schedule::*;
