use std::io;
use std::path::PathBuf;

/// Errors from pointer device setup and injection.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The device node could not be opened (missing path, permissions).
    #[error("failed to open input device {}: {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device lacks an axis or button the selected mode needs.
    #[error("input device {device} does not support {missing}")]
    Capability { device: String, missing: String },

    #[error("invalid pointer configuration: {0}")]
    Config(String),

    #[error("pointer device is already initialized")]
    AlreadyInitialized,

    #[error("pointer device is not initialized")]
    NotInitialized,

    /// Writing a frame to an initialized device failed.
    #[error("failed to inject pointer frame: {0}")]
    Injection(#[source] io::Error),
}

impl InputError {
    /// Integer status code for callers that speak the C-style
    /// `0 = success, negative = error` convention.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::DeviceOpen { .. } => -1,
            Self::Capability { .. } => -2,
            Self::Config(_) => -3,
            Self::AlreadyInitialized => -4,
            Self::NotInitialized => -5,
            Self::Injection(_) => -6,
        }
    }

    /// Collapse a result into its status code.
    #[must_use]
    pub fn status<T>(result: &Result<T, Self>) -> i32 {
        result.as_ref().map_or_else(Self::code, |_| 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_negative() {
        let errors = [
            InputError::DeviceOpen {
                path: PathBuf::from("/dev/input/event9"),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
            InputError::Capability {
                device: "touch".to_string(),
                missing: "ABS_X".to_string(),
            },
            InputError::Config("bad".to_string()),
            InputError::AlreadyInitialized,
            InputError::NotInitialized,
            InputError::Injection(io::Error::from(io::ErrorKind::BrokenPipe)),
        ];
        let mut codes: Vec<i32> = errors.iter().map(InputError::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn status_of_ok_is_zero() {
        let ok: Result<(), InputError> = Ok(());
        assert_eq!(InputError::status(&ok), 0);
        let err: Result<(), InputError> = Err(InputError::NotInitialized);
        assert_eq!(InputError::status(&err), -5);
    }

    #[test]
    fn device_open_message_names_path() {
        let err = InputError::DeviceOpen {
            path: PathBuf::from("/dev/input/event3"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/dev/input/event3"));
    }
}
