pub mod backoff;
pub mod executor;
pub mod queue;
pub mod shutdown;
pub mod state_machine;
pub mod supervisor;
pub mod worker;
