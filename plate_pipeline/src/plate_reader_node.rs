use opencv::core::Point2d;
use opencv::prelude::Mat;
use plate_reader::{CharacterClassifier, PlateLayout, PlatePredictor, PlateReader, PlateReading};
use rusted_pipe::channels::read_channel::InputGenerator;
use rusted_pipe::channels::typed_read_channel::ReadChannel1;
use rusted_pipe::channels::typed_write_channel::WriteChannel1;
use rusted_pipe::graph::processor::Processor;
use rusted_pipe::graph::processor::ProcessorWriter;
use rusted_pipe::RustedPipeError;
use tracing::{debug, error, warn};

use crate::metrics::{FRAMES_PROCESSED, GLYPHS_CLASSIFIED, PLATES_READ, READER_FAILURES};

/// What travels downstream for each plate: the text and where it was.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateText {
    pub text: String,
    /// Plate quad in frame pixels, top-left first and clockwise.
    pub corners: [Point2d; 4],
    pub layout: PlateLayout,
    pub confidence: f32,
}

impl From<&PlateReading> for PlateText {
    fn from(reading: &PlateReading) -> Self {
        Self {
            text: reading.text.clone(),
            corners: reading.crop.corners,
            layout: reading.crop.layout,
            confidence: reading.crop.confidence,
        }
    }
}

/// Runs the full plate reader on every incoming frame.
pub struct PlateReaderNode<P, C> {
    reader: PlateReader<P, C>,
}

impl<P: PlatePredictor, C: CharacterClassifier> PlateReaderNode<P, C> {
    pub fn new(reader: PlateReader<P, C>) -> Self {
        Self { reader }
    }

    /// Reads one frame. A failing frame is logged, counted and yields no
    /// plates so the stream keeps going.
    pub fn read_frame(&mut self, frame: &Mat) -> Vec<PlateText> {
        FRAMES_PROCESSED.inc();
        match self.reader.read(frame) {
            Ok(readings) => {
                PLATES_READ.inc_by(readings.len() as u64);
                GLYPHS_CLASSIFIED.inc_by(readings.iter().map(|r| r.glyphs.len() as u64).sum());
                readings.iter().map(PlateText::from).collect()
            }
            Err(e) => {
                READER_FAILURES.inc();
                error!("plate reader failed: {e}");
                Vec::new()
            }
        }
    }
}

impl<P, C> Processor for PlateReaderNode<P, C>
where
    P: PlatePredictor + Send + Sync + 'static,
    C: CharacterClassifier + Send + Sync + 'static,
{
    type INPUT = ReadChannel1<Mat>;
    type OUTPUT = WriteChannel1<Vec<PlateText>>;
    fn handle(
        &mut self,
        input: <Self::INPUT as InputGenerator>::INPUT,
        mut output: ProcessorWriter<Self::OUTPUT>,
    ) -> Result<(), RustedPipeError> {
        let Some(image_packet) = input.c1() else {
            warn!("plate reader woke up without a frame");
            return Ok(());
        };
        debug!("plate reading {}", image_packet.version.timestamp_ns);

        let plates = self.read_frame(&image_packet.data);
        if output
            .writer
            .c1()
            .write(plates, &image_packet.version)
            .is_err()
        {
            warn!("dropped readings for {}", image_packet.version.timestamp_ns);
        }
        Ok(())
    }
}
