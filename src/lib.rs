// grbl-streamer: stream G-code to a motion controller over a serial link,
// windowed against the device's limited command buffer.

pub mod config;
pub mod error;
pub mod gcode;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::StreamConfig;
pub use error::StreamError;
pub use gcode::{Command, GcodeSource};
pub use session::{SessionStats, StreamSession};
pub use transport::{Channel, SerialChannel};
