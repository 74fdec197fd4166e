// marketplace/src/services/mod.rs

//! Domain logic and the outbound collaborator ports (gateway, email,
//! notifications) with their bundled implementations.

pub mod cart_splitter;
pub mod email;
pub mod gateway;
pub mod notifications;
pub mod order_numbers;
pub mod webhook_signature;
