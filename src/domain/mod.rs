// Domain layer - Plain data shared by every other layer
pub mod activity;
pub mod event;
pub mod report;
pub mod sample;
