//! cassette-vcr - record HTTP interactions once, replay them in every later run
//!
//! A [`Vcr`] keeps a stack of inserted [`Cassette`]s. An HTTP adapter asks
//! [`Vcr::response_for`] before making a request; on a miss it performs the
//! real request (if [`Vcr::real_http_connections_allowed`]) and hands the
//! result to [`Vcr::record_http_interaction`]. Ejecting the cassette writes
//! the new interactions to its file.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod hooks;
pub mod ignorer;
pub mod interaction;
pub mod matchers;
pub mod persister;
pub mod serializer;
pub mod template;
pub mod vcr;

pub use cassette::{Cassette, CassetteInfo, EjectOptions};
pub use config::{CassetteOptions, Config, RecordMode};
pub use error::{Result, VcrError};
pub use interaction::{HttpInteraction, Request, Response, ResponseStatus};
pub use matchers::MatcherRef;
pub use template::TemplateVariables;
pub use vcr::Vcr;
