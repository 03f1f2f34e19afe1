pub mod coordinator;
pub mod effect;
pub mod notifications;
pub mod order_machine;
pub mod polling;
pub mod return_machine;
pub mod task;
pub mod tracking;
