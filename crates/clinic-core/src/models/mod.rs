//! Domain models for the clinic system.

mod appointment;
mod doctor;
mod finance;
mod money;
mod patient;
mod period;
mod visit;

pub use appointment::*;
pub use doctor::*;
pub use finance::*;
pub use money::*;
pub use patient::*;
pub use period::*;
pub use visit::*;
