mod archive;
mod client;
mod updates;

pub use client::ArbiterApi;
pub use updates::UpdateChannel;
