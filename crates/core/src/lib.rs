pub mod config;
pub mod domain;
pub mod errors;
pub mod normalize;
pub mod prompt;
pub mod redaction;
pub mod style;
pub mod telemetry;

pub use config::{AppConfig, ReviewDiscipline};
pub use domain::conversation::{Conversation, Role, Turn};
pub use domain::plan::PromptPlan;
pub use errors::{ApplicationError, InputError, InterfaceError};
pub use normalize::{normalize, CoachRequest, ConversationInput, InputShape, NormalizedInput};
pub use prompt::{CoachingProfile, ProfileError, PromptAssembler};
pub use style::LineBudget;
pub use telemetry::{LogRecord, RecordPolicy, UsageMetadata};
