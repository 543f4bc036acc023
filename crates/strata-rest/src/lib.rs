//! # strata-rest
//!
//! REST backend adapter for the Strata persistence layer, for remote
//! services speaking JSON:API over HTTP. The capability seam is
//! [`HttpClient`]: one send-a-request method, implemented for blocking
//! `reqwest` by [`ReqwestClient`] and by recording fakes in tests.
//! [`RestTransport`] owns URI composition, authentication, and the
//! translation of HTTP statuses into the core error taxonomy, so
//! [`RestDatasource`] deals only in resources and DSL strings.

pub mod context;
pub mod datasource;
pub mod http;
pub mod wire;

pub use context::{RestConfig, RestDataContext, RestTransport};
pub use datasource::{GetOptions, RestDatasource};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use wire::{envelope, Document, PrimaryData, WireError};
