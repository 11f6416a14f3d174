pub mod coordinator;
pub mod scheduler;

pub use coordinator::{PicklistCoordinator, PicklistError};
pub use scheduler::{AtScheduler, OneShotScheduler, ScheduleError};
