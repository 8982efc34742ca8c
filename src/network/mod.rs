//! Network subsystem: TCP transport and stream demultiplexing

pub mod buffer;
pub mod demux;
pub mod subsystem;
pub mod transport;

pub use buffer::ByteIngestBuffer;
pub use demux::{DemuxStats, FrameDemultiplexer};
pub use subsystem::TransportSubsystem;
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
