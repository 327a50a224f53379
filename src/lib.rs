pub mod auth;
pub mod catalog;
pub mod config;
pub mod http;
pub mod logging;
pub mod login;
pub mod mirror;
pub mod models;
pub mod quickxor;
pub mod reconcile;
pub mod refresh;
pub mod service;
