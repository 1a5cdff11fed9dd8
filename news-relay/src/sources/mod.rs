pub mod jsonl_events;
pub mod jsonl_history;

pub use jsonl_events::JsonlEventStream;
pub use jsonl_history::JsonlHistory;
