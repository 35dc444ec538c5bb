pub mod portfolio;
pub mod price;
pub mod snapshot;
pub mod time_range;
