//! `adaas-charts`
//!
//! **Responsibility:** turn tabular rows plus a declarative [`ChartDescriptor`]
//! into a renderer-ready [`ChartSpec`].
//!
//! Everything in this crate is pure: no I/O, no shared state. The same
//! descriptor and rows always produce the same spec.

pub mod builder;
pub mod color;
pub mod descriptor;
pub mod recommend;
pub mod sampler;
pub mod spec;

pub use builder::{ChartBuilder, build};
pub use color::{HeatColor, Rgba};
pub use descriptor::{ChartDescriptor, ChartKind, parse_descriptors};
pub use recommend::recommend;
pub use sampler::{ChartLimits, FiveNumberSummary};
pub use spec::{Axes, ChartSpec, HeatCell, Orientation, Point, RenderOptions, Series, SeriesData};
