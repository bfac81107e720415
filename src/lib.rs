pub mod capacity;
pub mod config;
pub mod corrections;
pub mod counts;
pub mod efficiency;
pub mod network;
pub mod output;
pub mod pipeline;
pub mod scale;
