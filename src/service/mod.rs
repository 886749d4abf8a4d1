pub mod background_jobs;
pub mod completion_machine;
pub mod completion_service;
pub mod error;
pub mod escrow_service;
pub mod gig_service;
pub mod notification_service;
