// redis::RedisError -> AppError
//
// Orphan rules forbid `impl From<RedisError> for AppError` here, so every
// call site maps through this helper.

use feedq_core::error::AppError;
use redis::{ErrorKind, RedisError};

pub(crate) fn map_redis_error(err: RedisError) -> AppError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        return AppError::Connectivity(err.to_string());
    }

    match err.kind() {
        // Reply did not have the expected shape (e.g. non-UTF-8 list item)
        ErrorKind::TypeError => AppError::MalformedPayload(format!("unexpected reply: {}", err)),
        // Server refused the command (WRONGTYPE, non-integer hash value, ...)
        ErrorKind::ResponseError => {
            AppError::MalformedPayload(format!("store rejected command: {}", err))
        }
        ErrorKind::AuthenticationFailed | ErrorKind::InvalidClientConfig => {
            AppError::Connectivity(format!("cannot use connection: {}", err))
        }
        _ => AppError::Connectivity(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_are_connectivity() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = map_redis_error(RedisError::from(io));
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_type_errors_are_malformed() {
        let err = map_redis_error(RedisError::from((ErrorKind::TypeError, "not a string")));
        assert!(matches!(err, AppError::MalformedPayload(_)));
    }

    #[test]
    fn test_bad_config_is_connectivity() {
        let err = map_redis_error(RedisError::from((
            ErrorKind::InvalidClientConfig,
            "bad url",
        )));
        assert!(err.is_connectivity());
    }
}
