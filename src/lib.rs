pub mod cloud;
pub mod config;
pub mod convert;
pub mod jsonl;
pub mod nlp;
pub mod pipeline;
pub mod register;
pub mod schema;
pub mod tables;
pub mod upload;
