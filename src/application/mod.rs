// Application layer - Decoding, analysis and aggregation
pub mod activity_aggregator;
pub mod clock;
pub mod frame_decoder;
pub mod motion_analyzer;
pub mod peak_detector;
pub mod pipeline;
pub mod report_store;
