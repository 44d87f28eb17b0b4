//! docrelay — webhook relay between a corporate messaging platform
//! ("workchat") and a document/collaboration platform ("docspace").
//!
//! Inbound callbacks are verified and decrypted by the [`crypto`] codec,
//! unwrapped by the [`envelope`] adapters, classified by [`handler`], and
//! relayed through the [`channels`] clients with an AI-generated summary
//! from [`summarizer`]. The [`gateway`] module wires it all into an axum
//! HTTP service.

pub mod channels;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod gateway;
pub mod handler;
pub mod storage;
pub mod summarizer;
