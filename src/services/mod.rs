pub mod assistant;
pub mod buckets;
pub mod formatter;
pub mod intent;
pub mod narrative;
pub mod normalizer;
pub mod prompts;
pub mod repair;
pub mod retriever;
pub mod validator;

pub use assistant::Assistant;
