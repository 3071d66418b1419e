//! The web module: HTTP control surface and event stream.

pub mod api;
pub mod models;
pub mod printer_channel;
