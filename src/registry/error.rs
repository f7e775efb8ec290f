//! Registry error types

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry already holds its maximum number of clients
    Full {
        /// Configured capacity
        capacity: usize,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::Full { capacity } => {
                write!(f, "client limit reached ({} clients)", capacity)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
