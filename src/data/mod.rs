//! Data access layer.

pub mod db {
    pub use crate::db::*;
}

pub mod repository {
    pub use crate::repository::*;
}
