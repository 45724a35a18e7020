pub mod dlq;
pub mod job;
pub mod status;
pub mod worker;
