mod camera;
mod capture_loop;
mod detect_service;
mod imaging;
mod live;
mod notice;
#[cfg(feature = "opencv-camera")]
mod opencv_camera;
mod overlay;
mod routes;
mod server;
mod session;
mod stream;
mod telemetry;
mod upload;

pub mod app;
pub mod config;
pub mod detection;

pub use app::start_app;
