//! Internal plugins: small processors built into sushi-core rather than
//! loaded from an external plugin format, used by the seed tests in §8 and
//! as working examples of the [`crate::processor::Processor`] contract.

mod control_to_cv;
mod gain;
mod passthrough;
mod sampler;

pub use control_to_cv::ControlToCvPlugin;
pub use gain::GainPlugin;
pub use passthrough::PassthroughPlugin;
pub use sampler::SamplerPlugin;
