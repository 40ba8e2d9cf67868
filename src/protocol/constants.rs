//! Protocol constants

use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default accept timeout; the accept loop re-checks its control state at least this often
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default deadline for writing one part to a client
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the rebind retry backoff
pub const DEFAULT_MAX_REBIND_BACKOFF: Duration = Duration::from_secs(60);

/// Multipart boundary token shared by the header and every part
pub const DEFAULT_BOUNDARY: &str = "CameraServeDataBoundary";

/// Value of the `Server` response header
pub const SERVER_NAME: &str = "CameraServe";

/// Content type announced for every part
pub const PART_CONTENT_TYPE: &str = "image/jpeg";
