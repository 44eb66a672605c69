pub mod clock;
pub mod documents;
pub mod warehouse;
