pub mod openai;
pub mod traits;

pub use openai::{OpenAiGenerator, DEFAULT_MODEL, OPENAI_API_BASE};
pub use traits::{GenerationRequest, Generator, GeneratorOutput, RetrievedExcerpt, Retriever};
