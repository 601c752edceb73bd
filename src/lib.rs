//! Bridge core between an ArtNet node and OpenRDM USB transmitters.
//!
//! The crate owns everything between the ArtNet callbacks and the serial
//! wire: the RDM packet codec, the binary-tree discovery algorithm, the
//! per-port device inventory, the transactional request/response engine and
//! the worker threads that drive DMX refresh and RDM traffic on each port.
//!
//! The ArtNet implementation and the USB-serial driver are collaborators
//! behind traits: the former implements [`ArtnetAdapter`] and calls into
//! [`Node`], the latter implements [`Transport`].

#[macro_use]
extern crate log;

pub use crate::config::*;
pub use crate::device::{MuteStatus, PortDevice};
pub use crate::inventory::Inventory;
pub use crate::node::{ArtnetAdapter, Node, NodeConfig, NodeError, PortId};
pub use crate::rdm::Uid;
pub use crate::rdm::packet::RdmPacket;
pub use crate::transport::{Transport, TransportError};

mod config;
pub mod device;
pub mod inventory;
pub mod node;
pub mod rdm;
mod synch;
pub mod transport;
