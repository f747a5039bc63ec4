//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod character;
pub mod training_hour;
pub mod training_post;
pub mod training_review;
pub mod training_session;

// Re-export specific types to avoid conflicts
pub use character::{Column as CharacterColumn, Entity as Character, Model as CharacterModel};
pub use training_hour::{
    Column as TrainingHourColumn, Entity as TrainingHour, Model as TrainingHourModel,
};
pub use training_post::{
    Column as TrainingPostColumn, Entity as TrainingPost, Model as TrainingPostModel,
};
pub use training_review::{
    Column as TrainingReviewColumn, Entity as TrainingReview, Model as TrainingReviewModel,
    ReviewOutcome,
};
pub use training_session::{
    Column as TrainingSessionColumn, Entity as TrainingSession, Model as TrainingSessionModel,
    SessionStatus, TrainingCategory,
};
