mod capture;
mod syslog;
mod syslog_parse;

pub use capture::InterfaceCapture;
pub use syslog::SyslogServer;
