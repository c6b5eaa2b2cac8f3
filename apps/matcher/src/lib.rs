pub mod audit;
pub mod config;
pub mod db;
pub mod errors;
pub mod llm_client;
pub mod matching;
pub mod models;
pub mod routes;
pub mod state;
