//! Sportify chat server - real-time event chat hub.
//!
//! This crate provides the live chat behind Sportify's sports events:
//! - Authorizing participants before their WebSocket is upgraded
//! - Broadcasting each message to every client in the same event room
//! - Replaying a bounded window of recent messages to late joiners
//! - Evicting clients whose writes fail or stall past a deadline
//!
//! # Architecture
//!
//! A single coordination loop ([`hub::Coordinator`]) owns the client set
//! and the per-event history. Connection tasks never touch that state
//! directly; they submit commands through a bounded queue, which gives
//! every registration, departure and broadcast one total order. Messages
//! are held in memory only.

pub mod config;
pub mod directory;
pub mod error;
pub mod history;
pub mod hub;
pub mod routes;
pub mod transport;
pub mod types;
