use rusted_pipe::channels::read_channel::InputGenerator;
use rusted_pipe::channels::typed_read_channel::ReadChannel1;
use rusted_pipe::graph::processor::TerminalProcessor;
use rusted_pipe::RustedPipeError;
use tracing::info;

use crate::plate_reader_node::PlateText;

/// Sink that logs plate readings, skipping a text already logged for the
/// previous frame.
#[derive(Default)]
pub struct ReadingLogger {
    last: Vec<String>,
    logged: u64,
}

impl ReadingLogger {
    pub fn logged(&self) -> u64 {
        self.logged
    }

    /// Returns the plates worth reporting for one frame.
    pub fn fresh<'a>(&mut self, plates: &'a [PlateText]) -> Vec<&'a PlateText> {
        let fresh: Vec<&PlateText> = plates
            .iter()
            .filter(|p| !p.text.is_empty() && !self.last.contains(&p.text))
            .collect();
        self.last = plates.iter().map(|p| p.text.clone()).collect();
        fresh
    }
}

impl TerminalProcessor for ReadingLogger {
    type INPUT = ReadChannel1<Vec<PlateText>>;
    fn handle(
        &mut self,
        mut input: <Self::INPUT as InputGenerator>::INPUT,
    ) -> Result<(), RustedPipeError> {
        if let Some(packet) = input.c1_owned() {
            for plate in self.fresh(&packet.data) {
                info!(
                    "{} [{:?}] at ({:.0}, {:.0}) confidence {:.2} frame {}",
                    plate.text,
                    plate.layout,
                    plate.corners[0].x,
                    plate.corners[0].y,
                    plate.confidence,
                    packet.version.timestamp_ns
                );
                self.logged += 1;
            }
        }

        Ok(())
    }
}
