//! Библиотека quote-client: отправляет и читает котировки по HTTP и следит за
//! лентой реального времени по WebSocket.

pub mod connection;
pub mod receiver;
pub mod requests;
