use cinebook_shared::Masked;
use serde::{Deserialize, Serialize};

/// A customer as known to the identity provider. Only read here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Masked<String>,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Masked(email.into()),
            name: name.into(),
        }
    }
}
