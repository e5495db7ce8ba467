pub mod backbones;
pub mod dispatch;
pub mod report;
pub mod run;
pub mod worker;

pub use dispatch::dispatch;
