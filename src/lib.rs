//! Review tooling for a longitudinal mixture-model analysis (library crate).
//!
//! Three independent batch pipelines share the loaders and statistics here:
//! [`fit_compare`], [`missing`] and [`descriptive`].

pub mod error;
pub mod logging;

pub mod console;
pub mod df_utils;
pub mod io;
pub mod layout;
pub mod linalg;
pub mod plot_utils;
pub mod qc;

pub mod mcar;
pub mod stats;

pub mod descriptive;
pub mod fit_compare;
pub mod missing;
