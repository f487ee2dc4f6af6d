//! Connection management module

pub mod association;
pub mod builder;
pub mod connection;
pub mod ln_connection;
pub mod sn_connection;

pub use association::ClientAssociation;
pub use builder::ConnectionBuilder;
pub use connection::Connection;
pub use ln_connection::LnConnection;
pub use sn_connection::{attribute_variable_name, method_variable_name, SnConnection};
