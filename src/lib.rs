pub mod app;
pub mod audio;
pub mod breakdown;
pub mod color;
pub mod config;
pub mod hash;
pub mod ingest;
pub mod lyrics;
pub mod model;
pub mod navigation;
pub mod playback;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod ui;
pub mod upload;
pub mod worker;
