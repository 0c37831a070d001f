//! UNIX-socket wire protocol for the spacenav daemon.
//!
//! This crate provides the frame layout, transport codecs, and a client
//! helper shared by the daemon and its consumers.
//!
//! # Architecture
//!
//! - [`frame`]: 32-byte event frames and per-client axis scaling
//! - [`transport`]: tokio-util codecs for event frames and sensitivity requests
//! - [`client`]: client helper for connecting to the daemon
//!
//! # Example
//!
//! ```no_run
//! use spnav_proto::SpnavClient;
//!
//! # async fn example() -> Result<(), spnav_proto::ClientError> {
//! let mut client = SpnavClient::connect().await?;
//! client.set_sensitivity(0.5).await?;
//!
//! while let Some(event) = client.next_event().await? {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod frame;
pub mod transport;

pub use client::{
    ClientError, DEFAULT_SOCKET_PATH, SOCKET_ENV, SpnavClient, resolve_socket_path, socket_path,
};

pub use frame::{
    EventFrame, FRAME_SIZE, FRAME_WORDS, FrameError, REQUEST_SIZE, TAG_MOTION, TAG_PRESS,
    TAG_RELEASE, scale_axis,
};

pub use transport::{CodecError, EventCodec, RequestCodec};
