pub mod compose;
pub mod events;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod queue;
pub mod storage;
pub mod worker;
