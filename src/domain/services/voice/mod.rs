mod controller;
mod meter;
mod pcm;
mod scheduler;

pub use controller::*;
