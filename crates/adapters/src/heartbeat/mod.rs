mod pinger;

pub use pinger::HeartbeatPinger;
