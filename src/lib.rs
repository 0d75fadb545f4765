// Library exports for isomirgff
pub mod alignment;
pub mod analyze;
pub mod bed;
pub mod context;
pub mod error;
pub mod gff;
pub mod intersect;
pub mod isomir;
pub mod output;
pub mod pipeline;
pub mod reference;
pub mod sequence;
pub mod store;
