//! # rundfunk-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON), gesteuert
//! ueber die Server-Konfiguration und Umgebungsvariablen.

pub mod logging;

pub use logging::{log_filter_gueltig, log_format_gueltig, logging_initialisieren, LogFormat};
