pub mod builders;
pub mod fakes;

pub use builders::{sample_charts, ChartBuilder};
pub use fakes::{FakeCluster, FakeHelm};
