//! Strategy layer: Catalog (C8) + Detector Engine (C9) + one function per
//! built-in strategy under [`detectors`] (§9 REDESIGN FLAGS: "one detector
//! function per strategy, parameterized by thresholds; variants are rows in
//! the catalog, not separate code").

pub mod catalog;
pub mod detectors;
pub mod engine;
