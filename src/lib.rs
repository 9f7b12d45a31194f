pub mod abi;
pub mod camera;
pub mod command;
pub mod detector;
pub mod encoder;
pub mod error;
pub mod ledger;
#[cfg(feature = "opencv")]
pub mod opencv_camera;
pub mod page;
pub mod prediction;
pub mod rpc;
#[cfg(test)]
mod test_support;
pub mod upload;
pub mod wallet;

pub mod app;
pub mod config;

pub use app::start_app;
