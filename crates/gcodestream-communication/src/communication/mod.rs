//! Serial link and acknowledgment handshake

pub mod ack;
pub mod serial;

pub use ack::{AckOutcome, AckReader};
pub use serial::{
    is_controller_port, list_ports, RealSerialPort, SerialLink, SerialParams, SerialPort,
    SerialPortInfo,
};
