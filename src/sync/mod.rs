pub mod bounded_queue;
pub mod executor;
pub mod thread_pool;
