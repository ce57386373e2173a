pub mod event_queue;
pub mod file_table;
pub mod handler;
pub mod handler_registry;
