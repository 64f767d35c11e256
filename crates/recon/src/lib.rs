//! `catalink-recon`: reconciles local catalog tables against an external
//! knowledge base.
//!
//! Pure engine crate: receives parsed rows and a lookup implementation,
//! returns reconciled rows plus a per-row report. No network or CLI
//! dependencies.

pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod geo;
pub mod index;
pub mod lookup;
pub mod matcher;
pub mod model;
pub mod names;
pub mod table;
pub mod years;

pub use config::ReconConfig;
pub use engine::{run, RunReport};
pub use error::ReconError;
pub use lookup::{ExternalLookup, LookupError, OfflineLookup};
pub use model::{
    CatalogRecord, Coordinate, EntityKind, Facts, InstitutionRecord, PersonRecord, Provenance,
    SpaceRecord,
};
