// Domain-layer modules and shared errors/models
pub mod audit {
    pub use crate::audit::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod errors {
    pub use crate::errors::*;
}
