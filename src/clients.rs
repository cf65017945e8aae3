pub mod generation;

pub use generation::{
    GenerationBackend, GenerationClient, GenerationError, GenerationRequest, GenerationSettings,
    NamedSchema,
};
