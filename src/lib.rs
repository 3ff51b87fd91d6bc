//! # clusterlink
//!
//! Point-to-point coordination between the members of a distributed data grid.
//!
//! - [`wire`] encodes the control messages members exchange. Every message carries the protocol
//!   version it was written with, and peers agree on that version with a handshake.
//! - [`connection`] wraps one established channel to one remote member, with serialized writes
//!   and pooled write buffers.
//! - [`reply`] sends a single reply straight back over the connection a request arrived on, and
//!   reports an unreachable requester as data instead of an error.
//! - [`cluster_config`] answers requests for the shared configuration of member groups.
//! - [`dispatch`] ties these together for both sides of a configuration request.
//!
//! Everything a member shares between its connections lives in a [`ClusterContext`].
//!
//! ```
//! use std::{collections::BTreeSet, sync::Arc};
//!
//! use clusterlink::{
//!     cluster_config::{ConfigGroup, InMemoryConfigurationSource},
//!     ClusterContext, Config, MemberId,
//! };
//!
//! let local = MemberId::generate("127.0.0.1:10334".parse().unwrap());
//! let ctx = ClusterContext::new(local, Config::default());
//! ctx.configuration_service()
//!     .mark_running(Arc::new(InMemoryConfigurationSource::with_groups([
//!         ConfigGroup::new("group1").with_jar("app.jar"),
//!     ])))
//!     .unwrap();
//!
//! let requested = BTreeSet::from(["group1".to_string(), "group3".to_string()]);
//! let snapshot = ctx
//!     .configuration_handler()
//!     .handle(&requested)
//!     .into_result()
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(snapshot.group_names().collect::<Vec<_>>(), ["group1"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod cluster_config;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod member;
pub mod reply;
pub mod wire;

pub use config::Config;
pub use connection::Connection;
pub use context::ClusterContext;
pub use member::MemberId;
pub use reply::DirectReplySender;
pub use wire::{Version, WireMessage};
