//! gRPC service implementations.

pub mod appender;
pub mod ingester;
pub mod merge;
pub mod mixer;
pub mod open_chunk;

use tonic::Status;

use loghouse_core::Error as CoreError;
use loghouse_storage::Error;

/// Maps internal errors onto gRPC status codes at the service boundary.
pub(crate) fn status_from_error(err: Error) -> Status {
    if err.is_not_found() {
        return Status::not_found(err.to_string());
    }
    match &err {
        Error::Core(CoreError::InvalidArgument(msg)) | Error::Core(CoreError::InvalidId(msg)) => {
            Status::invalid_argument(msg.clone())
        }
        Error::Core(CoreError::PreconditionFailed(msg)) => Status::failed_precondition(msg.clone()),
        _ => Status::internal(err.to_string()),
    }
}
