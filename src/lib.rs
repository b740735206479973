//! Playlist–track link prediction: graph construction, heterogeneous GraphSAGE
//! training, and an embedding-backed recommendation service.

pub mod config;
pub mod error;
pub mod gnn;
pub mod graph;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod training;
