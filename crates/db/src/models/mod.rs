pub mod dead_letter;
pub mod dimension;
pub mod fact_event;
pub mod pending_dimension;
pub mod run_log;
pub mod source_file;
pub mod status;
