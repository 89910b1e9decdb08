pub mod booking;
pub mod conflict;
pub mod detail;
pub mod lifecycle;
pub mod payment;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use detail::AppointmentDetailService;
pub use lifecycle::AppointmentLifecycleService;
pub use payment::PaymentService;
