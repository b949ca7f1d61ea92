//! The identity processor: copies input to output unchanged (§8 seed test 2
//! uses bypass on another processor, but an always-transparent stage is
//! useful on its own as a channel-count placeholder in a chain).

use crate::processor::{Chunk, Processor, ProcessorCore, ProcessorStatus};

pub struct PassthroughPlugin {
    core: ProcessorCore,
}

impl PassthroughPlugin {
    pub fn new(channel_count: usize) -> Self {
        let mut core = ProcessorCore::new("sushi.testing.passthrough");
        core.label = "Passthrough".into();
        core.channels.max_in = channel_count;
        core.channels.max_out = channel_count;
        core.channels.current_in = channel_count;
        core.channels.current_out = channel_count;
        Self { core }
    }
}

impl Processor for PassthroughPlugin {
    fn core(&self) -> &ProcessorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProcessorCore {
        &mut self.core
    }

    fn init(&mut self, _sample_rate: f64) -> ProcessorStatus {
        ProcessorStatus::Ok
    }

    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk) {
        output.replace_all(input);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_input_exactly() {
        let mut plugin = PassthroughPlugin::new(1);
        let mut input = Chunk::new(1);
        input.channel_mut(0).fill(0.5);
        let mut output = Chunk::new(1);
        plugin.process_audio(&input, &mut output);
        assert_eq!(output.channel(0), input.channel(0));
    }
}
