pub mod calendar;
pub mod conflict;
pub mod constraints;
pub mod coordinator;
pub mod intersect;
pub mod slots;

pub use coordinator::BookingCoordinator;
pub use intersect::AvailabilityService;
