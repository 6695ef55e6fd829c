//! Spotseek - a caching client for the Spotseeker REST API
//!
//! Requests go through a [`dao::Dao`], which consults a cache policy
//! before and after fetching from a live server or from mock fixture files.
//! [`data::SpotseekerClient`] maps the responses into typed spots.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dao;
pub mod data;
pub mod error;
pub mod http;
