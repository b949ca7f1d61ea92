//! The processor contract every signal-processing node implements (§3, §4.6).

use crate::parameter::{ParameterDescriptor, ParameterTable};
use crate::rt_event::{ProcessorId, RtEvent, RtEventKind};
use crate::sample_buffer::SampleBuffer;
use crate::AUDIO_CHUNK_SIZE;

/// The chunk-size-specialized buffer every processor in the graph sees.
/// `Processor::process_audio` is called across trait-object boundaries
/// (the registry stores `Box<dyn Processor>`), so the chunk size has to be
/// a single crate-wide constant rather than a per-call const generic —
/// `SampleBuffer<N>` itself stays generic for anything that wants a
/// different size outside the live graph (tests, offline rendering tools).
pub type Chunk = SampleBuffer<AUDIO_CHUNK_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelConfig {
    pub max_in: usize,
    pub max_out: usize,
    pub current_in: usize,
    pub current_out: usize,
}

static NEXT_PROCESSOR_ID: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(1);

pub fn next_processor_id() -> ProcessorId {
    NEXT_PROCESSOR_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
}

/// Shared identity and parameter-table state every processor carries,
/// embedded by composition (the capability-trait approach from Design
/// Notes: no deep inheritance, just a trait plus a struct every
/// implementation owns).
pub struct ProcessorCore {
    pub id: ProcessorId,
    pub name: String,
    pub label: String,
    pub uid: Option<String>,
    pub channels: ChannelConfig,
    pub enabled: bool,
    pub bypassed: bool,
    pub parameters: ParameterTable,
}

impl ProcessorCore {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: next_processor_id(),
            label: name.clone(),
            name,
            uid: None,
            channels: ChannelConfig::default(),
            enabled: true,
            bypassed: false,
            parameters: ParameterTable::new(),
        }
    }

    pub fn register_parameter(&mut self, descriptor: ParameterDescriptor) {
        self.parameters.register(descriptor);
    }
}

/// The trait every signal-processing node implements: internal DSP, the
/// track composite, the MIDI-driven control-to-CV plugin, a file-backed
/// sampler, or a wrapper around an externally loaded plugin format.
pub trait Processor: Send {
    fn core(&self) -> &ProcessorCore;
    fn core_mut(&mut self) -> &mut ProcessorCore;

    fn id(&self) -> ProcessorId {
        self.core().id
    }

    /// Called once, off the RT thread, before the processor is inserted
    /// into the graph.
    fn init(&mut self, sample_rate: f64) -> ProcessorStatus;

    /// Called off the RT thread whenever the sample rate changes.
    fn configure(&mut self, _sample_rate: f64) {}

    fn set_enabled(&mut self, enabled: bool) {
        self.core_mut().enabled = enabled;
    }

    fn set_bypassed(&mut self, bypassed: bool) {
        self.core_mut().bypassed = bypassed;
    }

    fn is_bypassed(&self) -> bool {
        self.core().bypassed
    }

    /// Report the new output channel count this processor will produce
    /// given `input_channels` on its input, and reconfigure accordingly.
    /// The track cascades this across its processor chain (§4.7). Clamps
    /// to `max_in` when the processor has declared a capability; `max_in
    /// == 0` means uncapped (no processor has registered a capacity), so
    /// the input count passes through unclamped.
    fn set_input_channels(&mut self, input_channels: usize) -> usize {
        let core = self.core_mut();
        let cap = if core.channels.max_in == 0 {
            input_channels
        } else {
            core.channels.max_in
        };
        core.channels.current_in = input_channels.min(cap);
        core.channels.current_out = core.channels.current_in;
        core.channels.current_out
    }

    /// Handle one realtime event. The default handler here consumes
    /// parameter-change events and writes them into the parameter table;
    /// override to also react to note/MIDI events.
    fn process_event(&mut self, event: &RtEvent) {
        match event.kind {
            RtEventKind::FloatParameterChange { param, value, .. } => {
                let range = self
                    .core()
                    .parameters
                    .descriptors()
                    .iter()
                    .find(|d| d.id == param)
                    .map(|d| d.range.clone());
                if let Some(range) = range {
                    let normalized = range.normalize(value);
                    self.core().parameters.set_normalized(param, normalized);
                }
            }
            RtEventKind::SetBypassed { bypassed, .. } => self.set_bypassed(bypassed),
            _ => {}
        }
    }

    /// Process one chunk of audio. Must not allocate, lock, block, or
    /// invoke non-realtime-safe system calls.
    fn process_audio(&mut self, input: &Chunk, output: &mut Chunk);

    fn parameter_from_name(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.core().parameters.by_name(name)
    }

    /// Drain RT events this processor has queued since the last call
    /// (parameter-change notifications, blob releases). The default is a
    /// no-op for processors with nothing to report; `InternalPluginBase`
    /// users override it to surface their queue through the trait-object
    /// boundary the engine drains each chunk (§4.6 `output_event`).
    fn drain_outgoing(&mut self) -> Vec<RtEvent> {
        Vec::new()
    }
}

/// Pass input through unchanged, used by bypassed processors (the "helper
/// provided" in §4.6). A free function rather than a trait default so it
/// stays callable without an object-unsafe generic default method.
pub fn process_audio_bypassed(input: &Chunk, output: &mut Chunk) {
    debug_assert_eq!(input.channel_count(), output.channel_count());
    output.replace_all(input);
}

/// Helper mixed into processors that implement internal (non-wrapped-plugin)
/// DSP: stores a pushed-event queue for emitting RT events back up to the
/// engine (§4.6 `output_event`).
pub struct InternalPluginBase {
    pub outgoing: Vec<RtEvent>,
}

impl InternalPluginBase {
    pub fn new() -> Self {
        Self {
            outgoing: Vec::new(),
        }
    }

    /// Update the stored processed value for `param` and queue a
    /// notification RT event so the dispatcher's parameter manager picks it
    /// up (§4.6 `set_parameter_and_notify`).
    pub fn set_parameter_and_notify(
        &mut self,
        core: &ProcessorCore,
        offset: u16,
        param: crate::rt_event::ParamId,
        new_normalized: f32,
    ) {
        if let Some(processed) = core.parameters.set_normalized(param, new_normalized) {
            self.outgoing.push(RtEvent::float_parameter_change(
                offset,
                core.id,
                param,
                processed,
            ));
        }
    }

    /// Push a realtime event back up to the engine (e.g. a sampler freeing
    /// a swapped-out sample via `DeleteBlob`).
    pub fn output_event(&mut self, event: RtEvent) {
        self.outgoing.push(event);
    }

    /// Drain events queued since the last call, handing ownership to the
    /// engine's RT->non-RT ring.
    pub fn drain_outgoing(&mut self) -> std::vec::Drain<'_, RtEvent> {
        self.outgoing.drain(..)
    }
}

impl Default for InternalPluginBase {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterRange;

    struct Noop(ProcessorCore);

    impl Processor for Noop {
        fn core(&self) -> &ProcessorCore {
            &self.0
        }
        fn core_mut(&mut self) -> &mut ProcessorCore {
            &mut self.0
        }
        fn init(&mut self, _sample_rate: f64) -> ProcessorStatus {
            ProcessorStatus::Ok
        }
        fn process_audio(&mut self, input: &Chunk, output: &mut Chunk) {
            output.replace_all(input);
        }
    }

    #[test]
    fn bypassed_process_is_exact_passthrough() {
        let mut input = Chunk::new(1);
        input.channel_mut(0).fill(0.5);
        let mut output = Chunk::new(1);
        process_audio_bypassed(&input, &mut output);
        assert_eq!(output.channel(0), input.channel(0));
    }

    #[test]
    fn default_process_event_writes_parameter_table() {
        let mut core = ProcessorCore::new("noop");
        core.register_parameter(ParameterDescriptor::new(0, "gain", ParameterRange::linear(0.0, 2.0, 1.0)));
        let mut p = Noop(core);
        p.process_event(&RtEvent::float_parameter_change(0, p.id(), 0, 1.5));
        assert!((p.core().parameters.value(0).unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn set_input_channels_clamps_to_declared_capability() {
        let mut core = ProcessorCore::new("noop");
        core.channels.max_in = 2;
        let mut p = Noop(core);
        assert_eq!(p.set_input_channels(8), 2);
        assert_eq!(p.core().channels.current_in, 2);
        assert_eq!(p.core().channels.current_out, 2);
    }

    #[test]
    fn set_input_channels_passes_through_when_capability_unset() {
        let mut p = Noop(ProcessorCore::new("noop"));
        assert_eq!(p.core().channels.max_in, 0);
        assert_eq!(p.set_input_channels(8), 8);
    }
}
