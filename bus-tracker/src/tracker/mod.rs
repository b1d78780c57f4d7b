//! Live bus tracker client.
//!
//! This module retrieves live departure boards and journey timelines from
//! the bus tracker web service.
//!
//! The pipeline is URL builder → fetcher → parser. Each stage reports
//! failures as a [`RetrievalError`] and later stages never relabel an
//! earlier stage's error, so the kind seen by the UI is the kind raised
//! where the failure happened.

mod endpoint;
mod error;
mod fetcher;
mod mock;
mod parser;
mod types;
mod urls;

pub use endpoint::{TrackerConfig, TrackerEndpoint};
pub use error::{Cause, RetrievalError, RetrievalErrorKind};
pub use fetcher::{
    AssumeConnected, Connection, Connectivity, ConnectivityFlag, Fetcher, HttpFetcher,
    ReqwestTransport, Transport,
};
pub use mock::{FixtureError, FixtureFetcher};
pub use parser::{TrackerFault, parse_departures, parse_journey};
pub use types::{BusTime, BusTimesResponse, JourneyTime, JourneyTimesResponse, TimeData};
pub use urls::{TrackerUrlBuilder, UrlBuilder};
