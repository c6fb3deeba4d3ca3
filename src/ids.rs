use std::{borrow::Borrow, ops::Deref, sync::Arc};

use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[derive(serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(Arc::from(id))
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(Arc::from(id))
            }
        }
    };
}

string_id!(
    /// Identity of a single file-writer process, as announced in its status messages.
    ServiceId
);

string_id!(
    /// Identity of one unit of work (a file being written).
    JobId
);

string_id!(
    /// Identity of one control instruction sent to a worker.
    ///
    /// Commands belong to a job, but the registry indexes them by command id
    /// alone, so command ids must be unique across jobs.
    CommandId
);

impl JobId {
    /// Fresh random job id, handy for pre-registering a job before it is started.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl CommandId {
    /// Fresh random command id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}
