//! DLMS/COSEM server
//!
//! Logical devices hold COSEM objects behind accessor traits; each accepted
//! connection runs one [`Association`] that negotiates the AARQ, authenticates
//! the client and serves GET/SET/ACTION (logical names) or READ/WRITE (short
//! names) until release.
//!
//! ```rust,no_run
//! use dlms_core::{DataObject, ObisCode};
//! use dlms_interface::Data;
//! use dlms_server::{LogicalDevice, ObjectDirectory, ServerConfig, ServerListener};
//! use std::sync::Arc;
//!
//! # async fn run() -> dlms_core::DlmsResult<()> {
//! let device = LogicalDevice::new(1);
//! device.register(Data::new(ObisCode::new(0, 0, 96, 1, 0, 255), DataObject::Unsigned32(42)).into_object())?;
//! let directory = Arc::new(ObjectDirectory::new());
//! directory.add_device(device);
//!
//! let listener = ServerListener::bind("0.0.0.0:4059".parse().unwrap(), directory, ServerConfig::default()).await?;
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! listener.run(shutdown).await
//! # }
//! ```

pub mod association;
pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod range_set;

pub use association::{serve, Association};
pub use config::{ServerConfig, SessionKind};
pub use directory::{LogicalDevice, ObjectDirectory};
pub use error::{DlmsError, DlmsResult};
pub use listener::ServerListener;
pub use range_set::RangeSet;
