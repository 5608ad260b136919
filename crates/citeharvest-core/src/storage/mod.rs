pub mod atomic;
pub mod dataset;
pub mod failure_queue;
pub mod layout;
pub mod table;
