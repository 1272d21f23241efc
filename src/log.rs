//! Logging shim, selects between the `log` facade and `defmt`

#[cfg(not(feature = "defmt"))]
pub use log::{trace, debug, info, warn, error};

#[cfg(feature = "defmt")]
pub use defmt::{trace, debug, info, warn, error};

/// Bound for errors that may be logged under either backend
#[cfg(not(feature = "defmt"))]
pub trait FmtError: core::fmt::Debug {}

#[cfg(not(feature = "defmt"))]
impl <T: core::fmt::Debug> FmtError for T {}

/// Bound for errors that may be logged under either backend
#[cfg(feature = "defmt")]
pub trait FmtError: core::fmt::Debug + defmt::Format {}

#[cfg(feature = "defmt")]
impl <T: core::fmt::Debug + defmt::Format> FmtError for T {}
