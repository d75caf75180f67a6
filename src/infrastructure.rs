//! Infrastructure layer for the job stream transport, decoding, configuration
//! and logging

pub mod config;
pub mod frame_decoder;
pub mod http_client;
pub mod logging;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, LoggingConfig, StreamConfig};
pub use frame_decoder::FrameDecoder;
pub use http_client::{ByteStream, ReqwestStreamOpener, StreamOpener, StreamRequest, TransportError};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
