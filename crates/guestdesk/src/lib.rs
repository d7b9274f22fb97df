//! Guestdesk backend library.
//!
//! Core components for the guest-messaging support console: the conversation
//! synchronization engine (poller + webhook ingest), durable stores, the
//! WebSocket fan-out hubs and the viewer-side reconciler.

pub mod api;
pub mod conversation;
pub mod db;
pub mod llm;
pub mod poller;
pub mod provider;
pub mod readstate;
pub mod reconcile;
pub mod webhook;
pub mod ws;
