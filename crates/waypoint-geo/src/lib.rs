//! Geographic bias table and place-name disambiguation.
//!
//! The table maps lower-cased aliases to a canonical place with coordinates
//! and country. It is built once (either the built-in table or a TOML file)
//! and never mutated afterwards. [`GeoBiasResolver`] looks tokens up against
//! it: exact alias first, then the longest alias contained in the token, and
//! otherwise reports the token as unresolved.

pub mod error;
pub mod resolver;
pub mod table;

pub use error::GeoError;
pub use resolver::{GeoAnnotation, GeoBias, GeoBiasResolver, GeoResolution, MatchKind};
pub use table::{normalize, GeoBiasTable, GeoCityEntry};
