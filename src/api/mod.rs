// Thin namespace wrapper for API-layer components
pub mod handlers {
    pub use crate::handlers::*;
}

pub mod interceptor {
    pub use crate::interceptor::*;
}

pub mod extract {
    pub use crate::extract::*;
}
