//! Domain models for the GardenWatch monitor

mod alert;
mod hazard;
mod insight;
mod metric;
mod notification;
mod profile;
mod rule;

pub use alert::*;
pub use hazard::*;
pub use insight::*;
pub use metric::*;
pub use notification::*;
pub use profile::*;
pub use rule::*;
