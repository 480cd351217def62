pub mod concepts;
pub mod evaluation;
pub mod mastery;
pub mod rating;
pub mod task_selector;
