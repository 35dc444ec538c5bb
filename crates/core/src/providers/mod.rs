pub mod traits;

// API client implementations
pub mod coingecko;
