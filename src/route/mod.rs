//! # Route Resolution
//!
//! Builds the renderable hop list for a message from a correlation result and
//! the contact directory. Path sources, in priority order:
//!
//! 1. **frame match** - the repeater hashes of the correlated RX-log frame,
//!    provided it survives the [`DisplayGuard`](crate::correlation::DisplayGuard);
//! 2. **contact out_path** - the route last learned for the sender's contact.
//!    This is the route to or from that contact, not necessarily the route of
//!    this message;
//! 3. **none** - the hop count alone.

pub mod contacts;
pub mod resolver;

pub use contacts::{Contact, ContactBook, ContactDirectory, NodeType};
pub use resolver::{parse_out_path, PathSource, RouteNode, RouteResolver, RouteView, SelfNode};
