// Data models and input shapes for the meter lifecycle

pub mod meter;

pub use meter::{Meter, MeterDescriptor, MeterRecord, MeterUpdate, RecordMeta, Usage, UsageReport};
