pub mod metrics;
pub mod plate_reader_node;
pub mod reading_logger;
pub mod utils;
pub mod video_reader;
