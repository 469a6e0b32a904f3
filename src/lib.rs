//! Anchorite – deterministic DDL generation for bitemporal anchor schemas.
//!
//! Anchorite reads the definition of an anchor schema and writes the SQL
//! Server perspectives over it: for every anchor a time traveling table
//! valued function `t<name>`, a latest view `l<name>`, a point-in-time
//! function `p<name>`, a now view `n<name>`, and a difference function
//! `d<name>` when the anchor has historized attributes, plus an interval
//! function `i<name>` per historized attribute. The perspectives
//! denormalize an anchor, its attributes, and their knots from sixth back
//! to third normal form, over two axes of time: changing time (when a
//! value holds in the modeled world) and positing time (when a positor
//! asserted it, and how reliably).
//!
//! The DDL text itself is written in stencils, a small line-oriented
//! markup with `$entity.property` references and `$(predicate)?`
//! conditionals, parsed by pest into a syntax tree and rendered against an
//! immutable context. Everything that can be wrong with a stencil is
//! caught when it is parsed; everything that can be wrong with a schema
//! surfaces either when the schema is linked or as an isolated failure of
//! the one document it concerns.
//!
//! ## Modules
//! * [`schema`] – The linked anchor/attribute/knot model and the JSON
//!   definition it is read from.
//! * [`stencil`] – The stencil markup: parsing, contexts, rendering.
//!   Grammar details live in `stencil.pest`.
//! * [`perspective`] – The five anchor perspectives and their drop guards.
//! * [`interval`] – The per-attribute interval functions.
//! * [`error`] – The crate-wide error type.
//!
//! ## Quick Start
//! ```
//! use anchorite::perspective::{FailureMode, PerspectiveGenerator};
//! use anchorite::schema::Schema;
//!
//! let schema = Schema::load_str(r#"{
//!     "chronon": "datetime",
//!     "positorRange": "tinyint",
//!     "positingRange": "datetime",
//!     "equivalentRange": "tinyint",
//!     "endOfTime": "'9999-12-31'",
//!     "now": "getdate()",
//!     "anchors": [{
//!         "mnemonic": "CR", "name": "Car", "capsule": "dbo", "identityColumn": "CR_ID",
//!         "attributes": [{
//!             "mnemonic": "COL", "name": "CR_COL_Car_Color", "capsule": "dbo",
//!             "identityColumn": "CR_COL_ID", "anchorReference": "CR_COL_CR_ID",
//!             "valueColumn": "CR_COL_Color", "changingColumn": "CR_COL_ChangedAt",
//!             "timeRange": "datetime", "positingColumn": "CR_COL_PositedAt",
//!             "positorColumn": "CR_COL_Positor", "reliabilityColumn": "CR_COL_Reliability",
//!             "reliableColumn": "CR_COL_Reliable"
//!         }]
//!     }]
//! }"#).unwrap();
//! let generator = PerspectiveGenerator::new(&schema).unwrap();
//! let generated = generator.generate(FailureMode::FailFast).unwrap();
//! assert!(generated.sql.contains("CREATE FUNCTION [dbo].[tCar] ("));
//! assert!(generated.sql.contains("CREATE FUNCTION [dbo].[dCar] ("));
//! ```
//!
//! ## Determinism
//! Generation is a pure function of the schema: the same definition always
//! renders the same bytes, so generated files can be diffed and committed.
//! Rendered documents are emitted whole or not at all.
//!
//! ## See Also
//! * Anchor modeling background: <https://www.anchormodeling.com>

pub mod error;
pub mod interval;
pub mod perspective;
pub mod schema;
pub mod stencil;
