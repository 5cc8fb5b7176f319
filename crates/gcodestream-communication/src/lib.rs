//! # gcodestream Communication
//!
//! The serial side of the streamer: the serial link adapter, the framed
//! acknowledgment reader and the streaming engine that paces a job's lines
//! to the motion controller.

pub mod communication;
pub mod streamer;

pub use communication::{
    list_ports, AckOutcome, AckReader, RealSerialPort, SerialLink, SerialParams, SerialPort,
    SerialPortInfo,
};
pub use streamer::{commands::jog_command, StreamerConfig, StreamingEngine};
