pub mod tickets;

pub use tickets::{SupportService, TicketPolicy};
