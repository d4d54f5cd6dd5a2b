//! A pure Rust client for a partitioned SQL database that invokes
//! transactions as stored procedures over a length-prefixed binary
//! protocol, with async I/O (`tokio`) and partition-aware routing.
//!
//! The layering mirrors the wire's own layering: [`buffer`] is the
//! byte-level codec, [`value`]/[`schema`]/[`row`]/[`table`] are the
//! typed data model built on top of it, [`message`] frames the login
//! handshake and stored-procedure invocation, [`connection`] runs one
//! TCP session as an async actor, [`router`] turns a procedure call and
//! its parameters into a partition, and [`client`] ties the pool of
//! connections, the router, and request bookkeeping together into the
//! public entry point.
//!
//! ```no_run
//! use voltrs::{Client, ClientConfig, Procedure, Value, WireTag};
//!
//! # async fn example() -> voltrs::error::Result<()> {
//! let client = Client::new(ClientConfig::default());
//! client.create_connection("localhost", voltrs::DEFAULT_PORT, true).await?;
//!
//! let insert = Procedure::new("Insert", vec![WireTag::BigInt, WireTag::String]);
//! let mut params = insert.params();
//! params.add(Value::BigInt(1))?;
//! params.add(Value::String(Some(b"hello".to_vec())))?;
//! let response = client.invoke(&insert, params).await?;
//! assert!(response.success());
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod callback;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod hash;
pub mod listener;
pub mod message;
pub mod procedure;
pub mod router;
pub mod row;
pub mod schema;
pub mod table;
pub mod value;

#[cfg(feature = "derive")]
pub use voltrs_derive::FromRow;

pub use callback::{AbandonReason, InvokeInfo};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_PORT, DEFAULT_SERVICE};
pub use connection::{Connection, ConnectionEvent};
pub use error::{ClientError, Result};
pub use listener::{NullListener, StatusListener};
pub use message::auth::HashScheme;
pub use message::invocation::{InvocationResponse, StatusCode};
pub use procedure::{ParameterSet, Procedure};
pub use row::{FromRow, Row};
pub use schema::Schema;
pub use table::Table;
pub use value::{Decimal, Geography, GeographyPoint, Ring, Timestamp, Value, WireTag};
