/// Numeric reduction of MOKE loops.
///
/// ```text
///   centred loops ──► features     plateaus, Hc, Mr, loop area
///        │
///        ├──────────► calibration  centre vs polarizer offset → scale
///        │
///        └──────────► relation     rotation centre vs ellipticity centre
///
///   reflection: Fresnel model of an extra interface, independent of data
/// ```

pub mod calibration;
pub mod features;
pub mod fit;
pub mod relation;
pub mod reflection;
