//! Identifier types shared by sessions, grants and reconciliation records.

use paygate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Unique identifier for a payment session.
    SessionId
);
uuid_identifier!(
    /// Unique identifier for a merchant.
    MerchantId
);
uuid_identifier!(
    /// Unique identifier for a paywalled content item.
    ContentId
);
uuid_identifier!(
    /// Unique identifier for an access grant.
    GrantId
);
uuid_identifier!(
    /// Unique identifier for a reconciliation review item.
    ReviewId
);

/// Maximum accepted length of caller supplied user identifiers.
pub const USER_IDENTIFIER_MAX_LENGTH: usize = 255;

/// Caller supplied identifier of the user who pays for and later retrieves content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentifier(String);

impl UserIdentifier {
    /// Creates a validated user identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.chars().count() > USER_IDENTIFIER_MAX_LENGTH {
            return Err(AppError::Validation(format!(
                "user identifier must not exceed {USER_IDENTIFIER_MAX_LENGTH} characters"
            )));
        }

        if trimmed.is_empty() {
            return Err(AppError::Validation(
                "user identifier must not be empty".to_owned(),
            ));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Identifier used for grants of sessions created without a user identifier.
    ///
    /// The session id doubles as the bearer token for such anonymous purchases.
    #[must_use]
    pub fn for_anonymous_session(session_id: SessionId) -> Self {
        Self(format!("session:{session_id}"))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for UserIdentifier {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Bank-side transaction identifier, the idempotency key of a bank event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BankTransactionId(NonEmptyString);

impl BankTransactionId {
    /// Creates a validated bank transaction identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        NonEmptyString::new(value)
            .map(Self)
            .map_err(|_| AppError::Validation("bank transaction id must not be empty".to_owned()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for BankTransactionId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Name of one monitored external bank connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BankConnectionId(NonEmptyString);

impl BankConnectionId {
    /// Creates a validated bank connection identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        NonEmptyString::new(value.trim())
            .map(Self)
            .map_err(|_| AppError::Validation("bank connection id must not be empty".to_owned()))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for BankConnectionId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
