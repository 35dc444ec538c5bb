pub mod history_service;
pub mod portfolio_service;
pub mod snapshot_builder;
pub mod snapshot_scheduler;
