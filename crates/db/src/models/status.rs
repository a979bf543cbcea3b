//! Status helper enums mapping to SMALLSERIAL/SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. The file lifecycle
//! ids are intentionally duplicated in `cocho_core::lifecycle` because
//! `core` must have zero internal deps.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Uploaded-file processing lifecycle.
    FileStatus {
        Uploaded = 1,
        Parsing = 2,
        Validating = 3,
        Loading = 4,
        Loaded = 5,
        Failed = 6,
    }
}

define_status_enum! {
    /// Pending dimension-code resolution lifecycle.
    PendingStatus {
        Pending = 1,
        Resolved = 2,
        Rejected = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cocho_core::lifecycle;

    #[test]
    fn file_status_ids_match_core_lifecycle() {
        assert_eq!(FileStatus::Uploaded.id(), lifecycle::STATUS_UPLOADED);
        assert_eq!(FileStatus::Parsing.id(), lifecycle::STATUS_PARSING);
        assert_eq!(FileStatus::Validating.id(), lifecycle::STATUS_VALIDATING);
        assert_eq!(FileStatus::Loading.id(), lifecycle::STATUS_LOADING);
        assert_eq!(FileStatus::Loaded.id(), lifecycle::STATUS_LOADED);
        assert_eq!(FileStatus::Failed.id(), lifecycle::STATUS_FAILED);
    }

    #[test]
    fn status_id_conversion() {
        let id: StatusId = FileStatus::Loading.into();
        assert_eq!(id, 4);
        assert_eq!(PendingStatus::Rejected.id(), 3);
    }
}
