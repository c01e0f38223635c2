pub mod interfaces;
pub mod ports;
pub mod sockets;
