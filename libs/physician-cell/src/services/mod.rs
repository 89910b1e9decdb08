pub mod availability;
pub mod physician;
pub mod schedule;

pub use availability::{available_slots, intervals_overlap, AvailabilityService};
pub use physician::PhysicianService;
pub use schedule::ScheduleService;
