/*!
 * Executor Limits and Constants
 *
 * Centralized location for timeouts, buffer sizes and wire-format constants.
 */

use std::time::Duration;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Default wall-clock budget for a whole batch (30 minutes)
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Upper bound on a single poll(2) sleep while waiting on children (ms)
/// Bounds how late a child exit or the batch deadline is noticed
pub const POLL_INTERVAL_MS: u16 = 25;

// =============================================================================
// CHANNEL BUFFERS
// =============================================================================

/// Bytes read per drain call on a capture or result pipe
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Initial capacity of a child's capture buffer
pub const INITIAL_CAPTURE_CAPACITY: usize = 4 * 1024;

// =============================================================================
// RESULT FRAMES
// =============================================================================

/// Result frame format version, first byte of every frame
pub const RESULT_FRAME_VERSION: u8 = 1;

/// Frame header: version byte + u32 little-endian body length
pub const RESULT_FRAME_HEADER_LEN: usize = 5;

/// Largest result frame body accepted by the parent (256MB)
pub const MAX_RESULT_FRAME_SIZE: usize = 256 * 1024 * 1024;

// =============================================================================
// CHILD EXIT CODES
// =============================================================================

/// Task body returned a value and the frame was written
pub const EXIT_SUCCESS: i32 = 0;

/// Task body failed and the failure frame was written
pub const EXIT_TASK_FAILED: i32 = 1;

/// The result frame could not be written to the parent
pub const EXIT_CHANNEL_FAILED: i32 = 2;
