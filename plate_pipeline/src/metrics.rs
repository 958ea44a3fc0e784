use lazy_static::lazy_static;
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

lazy_static! {
    pub static ref FRAMES_PROCESSED: IntCounter = register_int_counter!(
        "plate_frames_processed_total",
        "Frames that went through the plate reader"
    )
    .expect("metric registered twice");
    pub static ref PLATES_READ: IntCounter = register_int_counter!(
        "plate_plates_read_total",
        "Plates detected and rectified"
    )
    .expect("metric registered twice");
    pub static ref GLYPHS_CLASSIFIED: IntCounter = register_int_counter!(
        "plate_glyphs_classified_total",
        "Characters segmented and classified"
    )
    .expect("metric registered twice");
    pub static ref READER_FAILURES: IntCounter = register_int_counter!(
        "plate_reader_failures_total",
        "Frames the plate reader failed on"
    )
    .expect("metric registered twice");
}

/// Every registered metric in the prometheus text format.
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
