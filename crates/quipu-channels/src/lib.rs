//! # quipu-channels
//!
//! Messaging platform integrations. Currently: WhatsApp Cloud API
//! (webhook in, Graph API out).

pub mod whatsapp;

pub use whatsapp::WhatsAppChannel;
