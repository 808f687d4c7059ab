//! External service integrations.

pub mod kafka_rest {
    pub use crate::kafka_rest::*;
}
