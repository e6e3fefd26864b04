//! Time-range analysis of ClickHouse queries for a caching proxy.
//!
//! [`parse`] finds the bucketed timestamp column, step, extent and tag
//! columns of a statement and returns it as a template; the template can be
//! filled with any other extent through [`interpolate_time_query`].

pub mod config;
pub mod dialect;
pub mod error;
pub mod eval;
pub mod extract;
pub mod keywords;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod request;
pub mod select;
pub mod template;
pub mod token;

pub use config::{AnalyzerConfig, ConfigError};
pub use dialect::{parse, parse_at};
pub use error::{ErrorClass, ErrorKind, ParseError};
pub use model::{Extent, FieldDefinition, OutputFormat, RequestOptions, TimeFormat, TimeRangeQuery};
pub use request::{parse_time_range_request, upstream_url};
pub use template::interpolate_time_query;
