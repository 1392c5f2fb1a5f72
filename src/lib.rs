// ABOUTME: Library root for the image generation operations toolkit
// ABOUTME: Job lifecycle client, backend API, provider simulator and adapter storage

pub mod adapters;
pub mod commands;
pub mod config;
pub mod error;
pub mod jobs;
pub mod remote;
pub mod server;
pub mod simulator;
pub mod storage;

pub use error::JobError;
