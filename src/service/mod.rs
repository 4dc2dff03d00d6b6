pub mod base_service;
pub mod watchdog;
