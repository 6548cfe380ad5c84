pub mod endpoint_probe;
pub mod log_scanner;
pub mod process_checker;
pub mod process_sampler;
pub mod threshold_evaluator;

pub use endpoint_probe::EndpointProbe;
pub use log_scanner::LogScanner;
pub use process_checker::ProcessMatcher;
pub use process_sampler::ProcessSampler;
pub use threshold_evaluator::evaluate;
