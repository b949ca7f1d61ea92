//! A single-parameter gain stage (§8 seed test 1: 6dB ⇒ ~1.9953 linear).

use crate::parameter::{db_to_linear_preprocessor, ParameterDescriptor, ParameterRange};
use crate::processor::{Chunk, InternalPluginBase, Processor, ProcessorCore, ProcessorStatus};

const GAIN_PARAM: crate::rt_event::ParamId = 0;

pub struct GainPlugin {
    core: ProcessorCore,
    base: InternalPluginBase,
}

impl GainPlugin {
    pub fn new(channel_count: usize) -> Self {
        let mut core = ProcessorCore::new("sushi.testing.gain");
        core.label = "Gain".into();
        core.channels.max_in = channel_count;
        core.channels.max_out = channel_count;
        core.channels.current_in = channel_count;
        core.channels.current_out = channel_count;
        core.register_parameter(
            ParameterDescriptor::new(GAIN_PARAM, "gain", ParameterRange::linear(-60.0, 12.0, 0.0))
                .with_label("Gain")
                .with_preprocessor(db_to_linear_preprocessor()),
        );
        Self {
            core,
            base: InternalPluginBase::new(),
        }
    }

    fn gain_linear(&self) -> f32 {
        self.core.parameters.value(GAIN_PARAM).unwrap_or(1.0)
    }
}

impl Processor for GainPlugin {
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
        output.apply_gain(self.gain_linear());
        let _ = self.base.drain_outgoing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt_event::RtEvent;

    #[test]
    fn six_db_scales_unity_input_to_expected_linear_gain() {
        let mut plugin = GainPlugin::new(2);
        plugin.init(48000.0);
        plugin.process_event(&RtEvent::float_parameter_change(0, plugin.id(), GAIN_PARAM, 6.0));

        let mut input = Chunk::new(2);
        input.channel_mut(0).fill(1.0);
        input.channel_mut(1).fill(1.0);
        let mut output = Chunk::new(2);
        plugin.process_audio(&input, &mut output);

        for ch in 0..2 {
            for &s in output.channel(ch) {
                assert!((s - 1.9953).abs() < 0.01, "got {}", s);
            }
        }
    }
}
