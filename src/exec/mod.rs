pub mod command;
pub mod commander;
pub mod statuses;

pub use command::Template;
pub use commander::Commander;
pub use statuses::Status;
pub use statuses::Statuses;
